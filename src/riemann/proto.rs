//! Riemann protocol buffer messages and length-prefixed framing.
//!
//! Only the fields this crate writes or reads are declared; prost skips
//! unknown fields on decode, so responses carrying `states` or `query` still
//! parse.

use std::io::Read;

use prost::Message;

use super::{error::TransportError, event};

#[derive(Clone, PartialEq, Message)]
pub struct Msg {
    #[prost(bool, optional, tag = "2")]
    pub ok: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Event {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(float, optional, tag = "8")]
    pub ttl: Option<f32>,
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<Attribute>,
    #[prost(double, optional, tag = "14")]
    pub metric_d: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

impl From<&event::Event> for Event {
    fn from(event: &event::Event) -> Self {
        Self {
            time: Some(event.time_epoch_seconds),
            state: Some(event.state.as_str().to_owned()),
            service: Some(event.service.clone()),
            host: Some(event.host.clone()),
            description: Some(event.description.clone()),
            tags: event.tags.clone(),
            ttl: Some(event.ttl_seconds),
            attributes: event
                .attributes
                .iter()
                .map(|(key, value)| Attribute {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
                .collect(),
            metric_d: Some(event.service_metric),
        }
    }
}

/// Outcome reported by the server for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub ok: bool,
    pub error: Option<String>,
}

impl From<Msg> for Response {
    fn from(msg: Msg) -> Self {
        Self {
            ok: msg.ok.unwrap_or(false),
            error: msg.error,
        }
    }
}

/// Frame the payload with a big-endian length prefix.
pub fn frame_payload(payload: &[u8], max_size: usize) -> Option<Vec<u8>> {
    if payload.len() > max_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;
    let capacity = payload.len().checked_add(4)?;
    let mut framed = Vec::with_capacity(capacity);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Some(framed)
}

/// Serialise a batch of events into a single framed request.
pub fn encode_events(events: &[event::Event], max_size: usize) -> Result<Vec<u8>, TransportError> {
    let msg = Msg {
        ok: None,
        error: None,
        events: events.iter().map(Event::from).collect(),
    };
    let payload = msg.encode_to_vec();
    frame_payload(&payload, max_size).ok_or(TransportError::FrameTooLarge {
        size: payload.len(),
        max: max_size,
    })
}

/// Read one framed response message.
pub fn read_response<R: Read + ?Sized>(
    reader: &mut R,
    max_size: usize,
) -> Result<Response, TransportError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Msg::decode(payload.as_slice())?.into())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::riemann::event::State;
    use rstest::rstest;

    fn sample_event() -> event::Event {
        event::Event {
            service_metric: 0.5,
            time_epoch_seconds: 7,
            state: State::Warning,
            service: "cpu.load".into(),
            host: "h1".into(),
            description: String::new(),
            tags: vec!["a".into(), "b".into()],
            ttl_seconds: 10.0,
            attributes: vec![("k".into(), "v".into()), ("a".into(), "z".into())],
        }
    }

    fn response_frame(ok: bool, error: Option<&str>) -> Vec<u8> {
        let msg = Msg {
            ok: Some(ok),
            error: error.map(str::to_owned),
            events: Vec::new(),
        };
        frame_payload(&msg.encode_to_vec(), usize::MAX).expect("frame fits")
    }

    #[rstest]
    fn frame_payload_enforces_limit() {
        let payload = vec![0u8; 32];
        assert!(frame_payload(&payload, 16).is_none());
    }

    #[rstest]
    fn frame_payload_prefixes_length() {
        let payload = vec![1u8, 2, 3];
        let framed = frame_payload(&payload, 16).expect("payload fits frame");
        assert_eq!(&framed[..4], &3u32.to_be_bytes());
        assert_eq!(&framed[4..], payload);
    }

    #[rstest]
    fn encoded_request_carries_wire_fields() {
        let frame = encode_events(&[sample_event()], 1 << 20).expect("encode");
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);
        let msg = Msg::decode(&frame[4..]).expect("decode");
        assert_eq!(msg.events.len(), 1);
        let wire = &msg.events[0];
        assert_eq!(wire.service.as_deref(), Some("cpu.load"));
        assert_eq!(wire.state.as_deref(), Some("warning"));
        assert_eq!(wire.metric_d, Some(0.5));
        assert_eq!(wire.ttl, Some(10.0));
        assert_eq!(wire.time, Some(7));
        assert_eq!(wire.tags, vec!["a", "b"]);
        let keys: Vec<&str> = wire.attributes.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, ["k", "a"]);
    }

    #[rstest]
    fn oversized_batch_is_rejected() {
        let err = encode_events(&[sample_event()], 8).expect_err("limit must apply");
        assert!(matches!(err, TransportError::FrameTooLarge { max: 8, .. }));
    }

    #[rstest]
    #[case(true, None)]
    #[case(false, Some("boom"))]
    fn reads_response_frames(#[case] ok: bool, #[case] error: Option<&str>) {
        let mut cursor = Cursor::new(response_frame(ok, error));
        let response = read_response(&mut cursor, 1024).expect("read response");
        assert_eq!(response.ok, ok);
        assert_eq!(response.error.as_deref(), error);
    }

    #[rstest]
    fn response_without_ok_flag_is_a_failure() {
        let frame = frame_payload(&Msg::default().encode_to_vec(), 1024).unwrap();
        let response = read_response(&mut Cursor::new(frame), 1024).expect("read");
        assert!(!response.ok);
    }

    #[rstest]
    fn oversized_response_is_rejected_before_reading_payload() {
        let mut cursor = Cursor::new(1_000_000u32.to_be_bytes().to_vec());
        let err = read_response(&mut cursor, 1024).expect_err("limit must apply");
        assert!(matches!(err, TransportError::FrameTooLarge { size: 1_000_000, .. }));
    }

    #[rstest]
    fn truncated_response_is_an_io_error() {
        let mut frame = response_frame(true, None);
        frame.truncate(frame.len() - 1);
        let err = read_response(&mut Cursor::new(frame), 1024).expect_err("truncated");
        assert!(matches!(err, TransportError::Io(_)));
    }
}
