//! Multi-touch event set
//!
//! Sending-side view of every finger currently on the device. Only the
//! dispatcher task touches it, so it carries no locking.
//!
//! # Pointer index rules
//!
//! - an identity keeps its value for the whole gesture
//! - the pointer index is the identity's position in the active list and is
//!   recomputed for every action, because a finger in the middle may lift first
//! - a released identity may come back with a later DOWN
//!
//! `MOVE` never carries a pointer index, matching what the device expects.

use super::intent::{ControlEventType, FrameSize, MotionAction, Point, TouchId, MAX_FINGERS};
use bytes::{BufMut, BytesMut};
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

#[derive(Debug, Default)]
pub struct TouchEventSet {
    points: Vec<(TouchId, Point)>,
    action: u16,
}

impl TouchEventSet {
    pub fn new() -> Self {
        Self {
            points: Vec::with_capacity(MAX_FINGERS),
            action: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(TouchId, Point)] {
        &self.points
    }

    fn position(&self, id: TouchId) -> Option<usize> {
        self.points.iter().position(|(held, _)| *held == id)
    }

    /// Applies one finger action and computes the wire action for it.
    ///
    /// Returns `None` if the action breaks a touch invariant (only reachable in
    /// release builds; debug builds panic).
    pub fn accept(&mut self, id: TouchId, point: Point, action: MotionAction) -> Option<u16> {
        let encoded = match action {
            MotionAction::Down => {
                if self.position(id).is_some() {
                    return invariant_violation(format_args!("finger {} is already down", id));
                }
                if self.points.len() >= MAX_FINGERS {
                    return invariant_violation(format_args!(
                        "more than {} active touches",
                        MAX_FINGERS
                    ));
                }
                self.points.push((id, point));
                let index = self.points.len() - 1;
                if index > 0 {
                    MotionAction::PointerDown.encode(index as u8)
                } else {
                    MotionAction::Down.encode(0)
                }
            }
            MotionAction::Up => {
                let Some(index) = self.position(id) else {
                    return invariant_violation(format_args!("UP for unknown finger {}", id));
                };
                self.points[index].1 = point;
                if self.points.len() > 1 {
                    MotionAction::PointerUp.encode(index as u8)
                } else {
                    MotionAction::Up.encode(0)
                }
            }
            MotionAction::Move => {
                let Some(index) = self.position(id) else {
                    return invariant_violation(format_args!("MOVE for unknown finger {}", id));
                };
                self.points[index].1 = point;
                MotionAction::Move.encode(0)
            }
            MotionAction::PointerDown | MotionAction::PointerUp => {
                return invariant_violation(format_args!(
                    "{:?} is derived by the touch set, not sent by producers",
                    action
                ));
            }
        };
        self.action = encoded;
        Some(encoded)
    }

    /// Encodes the current set into `buf` (cleared first).
    pub fn encode(&self, buf: &mut BytesMut, frame_size: FrameSize) {
        buf.clear();
        buf.put_u8(ControlEventType::Touch.tag());
        buf.put_u16(self.action);
        buf.put_u8(self.points.len() as u8);
        for (id, point) in &self.points {
            buf.put_u16(point.x);
            buf.put_u16(point.y);
            buf.put_u8(id.get());
        }
        buf.put_u16(frame_size.width);
        buf.put_u16(frame_size.height);
    }

    /// Drops lifted fingers once their frame reached the wire.
    fn commit(&mut self) {
        match MotionAction::decode(self.action) {
            Some((MotionAction::Up, _)) => self.points.clear(),
            Some((MotionAction::PointerUp, index)) => {
                let index = index as usize;
                if index < self.points.len() {
                    self.points.remove(index);
                }
            }
            _ => {}
        }
    }

    /// Writes the frame for the last accepted action to `sink`.
    ///
    /// The set is only updated after the write succeeded; on error it is left
    /// exactly as it was.
    pub async fn serialize<W>(
        &mut self,
        sink: &mut W,
        buf: &mut BytesMut,
        frame_size: FrameSize,
    ) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.encode(buf, frame_size);
        sink.write_all(&buf[..]).await?;
        debug!(
            "Touch frame written: action={:#06x} touches={}",
            self.action,
            self.points.len()
        );
        self.commit();
        Ok(())
    }
}

fn invariant_violation(message: fmt::Arguments<'_>) -> Option<u16> {
    if cfg!(debug_assertions) {
        panic!("touch invariant violated: {}", message);
    }
    error!("Touch invariant violated, dropping event: {}", message);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    const FRAME: FrameSize = FrameSize::new(1080, 2340);

    fn id(raw: u8) -> TouchId {
        TouchId::new(raw)
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn single_down_frame_layout() {
        let mut set = TouchEventSet::new();
        let mut sink: Vec<u8> = Vec::new();
        let mut buf = BytesMut::new();

        set.accept(id(0), Point::new(100, 200), MotionAction::Down);
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();

        assert_eq!(
            sink,
            vec![2, 0x00, 0x00, 1, 0, 100, 0, 200, 0, 0x04, 0x38, 0x09, 0x24]
        );
    }

    #[tokio::test]
    async fn second_down_is_pointer_down_with_index() {
        let mut set = TouchEventSet::new();
        let mut sink: Vec<u8> = Vec::new();
        let mut buf = BytesMut::new();

        set.accept(id(0), Point::new(100, 200), MotionAction::Down);
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
        sink.clear();

        let action = set.accept(id(1), Point::new(50, 50), MotionAction::Down);
        assert_eq!(action, Some(0x0105));
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();

        assert_eq!(&sink[..4], &[2, 0x01, 0x05, 2]);
        assert_eq!(&sink[4..9], &[0, 100, 0, 200, 0]);
        assert_eq!(&sink[9..14], &[0, 50, 0, 50, 1]);
        assert_eq!(sink.len(), 4 + 2 * 5 + 4);
    }

    #[tokio::test]
    async fn pointer_up_renumbers_later_actions() {
        let mut set = TouchEventSet::new();
        let mut sink: Vec<u8> = Vec::new();
        let mut buf = BytesMut::new();

        for (raw, x) in [(0u8, 10u16), (1, 20), (2, 30)] {
            set.accept(id(raw), Point::new(x, x), MotionAction::Down);
            set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
        }

        // lift the middle finger
        assert_eq!(
            set.accept(id(1), Point::new(21, 21), MotionAction::Up),
            Some(MotionAction::PointerUp.encode(1))
        );
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
        assert_eq!(set.len(), 2);

        // id 2 moved from index 2 to index 1
        assert_eq!(
            set.accept(id(2), Point::new(30, 30), MotionAction::Up),
            Some(MotionAction::PointerUp.encode(1))
        );
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();

        assert_eq!(
            set.accept(id(0), Point::new(10, 10), MotionAction::Up),
            Some(MotionAction::Up.encode(0))
        );
        set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn count_byte_tracks_active_touches() {
        let mut set = TouchEventSet::new();
        let mut buf = BytesMut::new();
        let mut sink: Vec<u8> = Vec::new();

        for raw in 0..4u8 {
            set.accept(id(raw), Point::new(1, 1), MotionAction::Down);
            set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
            assert_eq!(buf[3] as usize, raw as usize + 1);
        }
        for raw in 0..4u8 {
            let before = set.len();
            set.accept(id(raw), Point::new(1, 1), MotionAction::Up);
            set.serialize(&mut sink, &mut buf, FRAME).await.unwrap();
            assert_eq!(buf[3] as usize, before);
            assert_eq!(set.len(), before - 1);
        }
    }

    #[tokio::test]
    async fn move_keeps_plain_action_code() {
        let mut set = TouchEventSet::new();
        set.accept(id(0), Point::new(1, 1), MotionAction::Down);
        set.accept(id(1), Point::new(2, 2), MotionAction::Down);
        assert_eq!(
            set.accept(id(1), Point::new(3, 3), MotionAction::Move),
            Some(0x0002)
        );
        assert_eq!(set.points()[1], (id(1), Point::new(3, 3)));
    }

    #[tokio::test]
    async fn failed_write_leaves_set_untouched() {
        let mut set = TouchEventSet::new();
        let mut buf = BytesMut::new();
        let mut ok_sink: Vec<u8> = Vec::new();

        set.accept(id(0), Point::new(5, 5), MotionAction::Down);
        set.serialize(&mut ok_sink, &mut buf, FRAME).await.unwrap();

        set.accept(id(0), Point::new(6, 6), MotionAction::Up);
        let result = set.serialize(&mut BrokenPipe, &mut buf, FRAME).await;
        assert!(result.is_err());
        assert_eq!(set.len(), 1);
        assert_eq!(set.points()[0], (id(0), Point::new(6, 6)));
    }

    #[test]
    #[should_panic(expected = "UP for unknown finger")]
    fn up_for_unknown_finger_panics_in_debug() {
        let mut set = TouchEventSet::new();
        set.accept(id(3), Point::new(1, 1), MotionAction::Up);
    }
}
