use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::link::{DeviceLink, LinkError, Subscription};

/// Wraps a link whose characteristic carries base64 text, as BLE GATT
/// writes and notifications do on the fretboard.
pub struct Base64Link<L> {
    inner: L,
}

impl<L: DeviceLink> Base64Link<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

pub fn encode_frame(frame: &[u8]) -> Vec<u8> {
    BASE64.encode(frame).into_bytes()
}

pub fn decode_frame(frame: &[u8]) -> Result<Vec<u8>, LinkError> {
    BASE64
        .decode(frame)
        .map_err(|err| LinkError::Encoding(err.to_string()))
}

#[async_trait]
impl<L: DeviceLink> DeviceLink for Base64Link<L> {
    async fn send(&self, frame: &[u8]) -> Result<(), LinkError> {
        self.inner.send(&encode_frame(frame)).await
    }

    fn subscribe(&self) -> Result<Subscription, LinkError> {
        Ok(self
            .inner
            .subscribe()?
            .with_transform(|frame| decode_frame(&frame)))
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LoopbackLink;

    #[tokio::test]
    async fn outbound_frames_are_base64_encoded() {
        let loopback = LoopbackLink::new();
        let link = Base64Link::new(loopback.clone());
        link.send(b"CAPO:2").await.unwrap();
        assert_eq!(loopback.sent_text(), vec!["Q0FQTzoy".to_string()]);
    }

    #[tokio::test]
    async fn inbound_frames_are_decoded() {
        let loopback = LoopbackLink::new();
        let link = Base64Link::new(loopback.clone());
        let mut subscription = link.subscribe().unwrap();
        loopback.deliver(encode_frame(b"CHORD:G Major;STATUS:A:CORRECT"));
        loopback.deliver("not base64!");
        assert_eq!(
            subscription.next_frame().await.unwrap().unwrap(),
            b"CHORD:G Major;STATUS:A:CORRECT"
        );
        assert!(matches!(
            subscription.next_frame().await,
            Some(Err(LinkError::Encoding(_)))
        ));
    }
}
