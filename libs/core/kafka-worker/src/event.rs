//! Record types shared by every broker backend.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// A record as handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` for tombstones and empty produces.
    pub payload: Option<Vec<u8>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record {
    /// Decode the payload as JSON. `None` when there is no payload.
    pub fn json<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.payload.as_deref().map(serde_json::from_slice)
    }

    /// Payload as lossy UTF-8, for logging.
    pub fn payload_preview(&self, max_len: usize) -> String {
        match &self.payload {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                if text.chars().count() > max_len {
                    let cut: String = text.chars().take(max_len).collect();
                    format!("{cut}...")
                } else {
                    text.into_owned()
                }
            }
            None => String::new(),
        }
    }
}

/// Where the broker stored an acknowledged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: i32,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn record(payload: Option<&[u8]>) -> Record {
        Record {
            topic: "send-mail".into(),
            partition: 0,
            offset: 7,
            key: None,
            payload: payload.map(<[u8]>::to_vec),
            timestamp: None,
        }
    }

    #[derive(Deserialize)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn test_json_decode() {
        let decoded: Ping = record(Some(br#"{"n":3}"#)).json().unwrap().unwrap();
        assert_eq!(decoded.n, 3);

        assert!(record(Some(b"not json")).json::<Ping>().unwrap().is_err());
        assert!(record(None).json::<Ping>().is_none());
    }

    #[test]
    fn test_payload_preview_truncates() {
        assert_eq!(record(Some(b"abcdef")).payload_preview(3), "abc...");
        assert_eq!(record(Some(b"abc")).payload_preview(3), "abc");
        assert_eq!(record(None).payload_preview(3), "");
    }
}
