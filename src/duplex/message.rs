use tokio_tungstenite::tungstenite::Message;

/// A data message on the duplex channel
///
/// Echoing preserves both the kind and the payload bit for bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplexMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl DuplexMessage {
    pub fn is_text(&self) -> bool {
        matches!(self, DuplexMessage::Text(_))
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            DuplexMessage::Text(text) => text.as_bytes(),
            DuplexMessage::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<DuplexMessage> for Message {
    fn from(message: DuplexMessage) -> Self {
        match message {
            DuplexMessage::Text(text) => Message::Text(text),
            DuplexMessage::Binary(data) => Message::Binary(data),
        }
    }
}

/// Control frames are handed back unchanged
impl TryFrom<Message> for DuplexMessage {
    type Error = Message;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::Text(text) => Ok(DuplexMessage::Text(text)),
            Message::Binary(data) => Ok(DuplexMessage::Binary(data)),
            other => Err(other),
        }
    }
}
