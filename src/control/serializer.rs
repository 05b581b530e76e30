//! Frame serializer
//!
//! Turns dispatched intents into wire bytes and writes them to the sink. Touch
//! intents go through the [`TouchEventSet`] first; every other frame type is a
//! stateless tag-plus-payload encoding.

use super::error::ControlError;
use super::intent::{ControlEventType, ControlIntent, FrameSize, TEXT_MAX_LENGTH};
use super::touch_set::TouchEventSet;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::debug;

/// Byte stream the control frames are written to
pub type ControlSink = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Serializer {
    sink: ControlSink,
    frame_size: watch::Receiver<FrameSize>,
    touches: TouchEventSet,
    buf: BytesMut,
}

impl Serializer {
    pub fn new(sink: ControlSink, frame_size: watch::Receiver<FrameSize>) -> Self {
        Self {
            sink,
            frame_size,
            touches: TouchEventSet::new(),
            buf: BytesMut::with_capacity(128),
        }
    }

    pub fn touches(&self) -> &TouchEventSet {
        &self.touches
    }

    /// Serializes one intent and writes it.
    ///
    /// Touch intents that violate a touch invariant are dropped without
    /// writing anything.
    pub async fn write_intent(&mut self, intent: ControlIntent) -> Result<(), ControlError> {
        let frame_size = *self.frame_size.borrow();
        match intent {
            ControlIntent::Touch { id, point, action } => {
                if self.touches.accept(id, point, action).is_none() {
                    return Ok(());
                }
                self.touches
                    .serialize(&mut self.sink, &mut self.buf, frame_size)
                    .await?;
            }
            other => {
                encode_frame(&other, frame_size, &mut self.buf);
                self.sink.write_all(&self.buf[..]).await?;
                debug!("Frame written: {:?} ({} bytes)", other.event_type(), self.buf.len());
            }
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ControlError> {
        self.sink.flush().await?;
        Ok(())
    }
}

/// Encodes a non-touch intent. Touch intents need the touch set and are
/// handled by [`TouchEventSet::encode`].
pub fn encode_frame(intent: &ControlIntent, frame_size: FrameSize, buf: &mut BytesMut) {
    buf.clear();
    match intent {
        ControlIntent::Keycode {
            action,
            keycode,
            meta_state,
        } => {
            buf.put_u8(ControlEventType::Keycode.tag());
            buf.put_u8(*action as u8);
            buf.put_i32(*keycode);
            buf.put_i32(*meta_state);
        }
        ControlIntent::Text(text) => {
            let text = truncate_utf8(text, TEXT_MAX_LENGTH);
            buf.put_u8(ControlEventType::Text.tag());
            buf.put_u16(text.len() as u16);
            buf.put_slice(text.as_bytes());
        }
        ControlIntent::Scroll {
            position,
            h_scroll,
            v_scroll,
        } => {
            buf.put_u8(ControlEventType::Scroll.tag());
            buf.put_u16(position.x);
            buf.put_u16(position.y);
            buf.put_u16(frame_size.width);
            buf.put_u16(frame_size.height);
            buf.put_i32(*h_scroll);
            buf.put_i32(*v_scroll);
        }
        ControlIntent::Command { action } => {
            buf.put_u8(ControlEventType::Command.tag());
            buf.put_u8(*action);
        }
        ControlIntent::Raw { tag, payload } => {
            buf.put_u8(*tag);
            buf.put_slice(payload);
        }
        ControlIntent::Touch { .. } => {
            unreachable!("touch frames are encoded by the touch set")
        }
    }
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
