//! Control session: wires queue, dispatcher, gestures and router together
//!
//! ```text
//! ControlSession::start ──► (InputRouter, SessionHandle)
//!                                 │              │
//!                            UI thread      owner of the lifecycle
//! ```
//!
//! Shutdown order matters: the router lifts what it holds, every gesture is
//! cancelled and awaited so their final UPs are queued, and only then the stop
//! sentinel goes in behind them.

use crate::control::{
    ControlError, ControlSink, DispatcherHandle, EventQueue, FingerSlots, FrameSize, QueueError,
    Serializer, DEFAULT_QUEUE_CAPACITY,
};
use crate::gesture::{GestureContext, VisionController, VisionHandle};
use crate::mapping::{InputRouter, KeyMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for gesture tasks to lift their fingers
const GESTURE_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub queue_capacity: usize,
    /// Forwarded control socket of the device
    pub device_address: String,
    pub frame_size: FrameSize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            device_address: "127.0.0.1:27183".to_string(),
            frame_size: FrameSize::new(1080, 1920),
        }
    }
}

pub struct ControlSession;

impl ControlSession {
    /// Starts the dispatcher and every session-wide gesture task on the
    /// current tokio runtime.
    pub fn start(
        sink: ControlSink,
        keymap: &KeyMap,
        settings: &SessionSettings,
    ) -> Result<(InputRouter, SessionHandle), ControlError> {
        let runtime = Handle::try_current()
            .map_err(|e| ControlError::Dispatcher(format!("no tokio runtime: {}", e)))?;
        keymap
            .validate()
            .map_err(|e| ControlError::Config(e.to_string()))?;
        if settings.queue_capacity == 0 {
            return Err(ControlError::Config("queue capacity must be positive".to_string()));
        }

        info!(
            "Starting control session, frame {}x{}",
            settings.frame_size.width, settings.frame_size.height
        );
        let (frame_size_tx, frame_size_rx) = watch::channel(settings.frame_size);
        let (queue, receiver) = EventQueue::new(settings.queue_capacity);
        let dispatcher =
            DispatcherHandle::spawn_on(&runtime, receiver, Serializer::new(sink, frame_size_rx));

        let ctx = GestureContext::new(
            queue.clone(),
            Arc::new(FingerSlots::new()),
            runtime,
            CancellationToken::new(),
        );
        let vision = keymap.vision.as_ref().map(|config| {
            let controller = VisionController::new(
                ctx.clone(),
                config.bounds(),
                config.sensitivity,
                config.idle_release,
            );
            VisionHandle::spawn(controller, ctx.child_token()).0
        });
        let router = InputRouter::new(ctx.clone(), keymap, vision)
            .map_err(|e| ControlError::Config(e.to_string()))?;

        Ok((
            router,
            SessionHandle {
                ctx,
                queue,
                frame_size: frame_size_tx,
                dispatcher,
            },
        ))
    }
}

pub struct SessionHandle {
    ctx: GestureContext,
    queue: EventQueue,
    frame_size: watch::Sender<FrameSize>,
    dispatcher: DispatcherHandle,
}

impl SessionHandle {
    /// Publishes a new device frame size; later frames embed it.
    pub fn set_frame_size(&self, size: FrameSize) {
        debug!("Frame size now {}x{}", size.width, size.height);
        self.frame_size.send_replace(size);
    }

    pub fn frame_size(&self) -> FrameSize {
        *self.frame_size.borrow()
    }

    pub fn fingers(&self) -> &Arc<FingerSlots> {
        self.ctx.fingers()
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_finished()
    }

    /// Resolves when the dispatcher exits on its own, e.g. after a sink
    /// failure.
    pub async fn closed(&self) {
        self.dispatcher.stopped().await
    }

    /// Ends the session and returns the number of frames written.
    pub async fn shutdown(self, mut router: InputRouter) -> Result<u64, ControlError> {
        info!("Shutting down control session");
        router.release_all();
        drop(router);

        self.ctx.shutdown();
        let tracker = self.ctx.tracker();
        tracker.close();
        if tokio::time::timeout(GESTURE_GRACE, tracker.wait())
            .await
            .is_err()
        {
            warn!("{} gesture tasks still running at shutdown", tracker.len());
        }

        loop {
            match self.queue.stop() {
                Ok(()) | Err(QueueError::Stopped) => break,
                Err(QueueError::Full) if self.dispatcher.is_finished() => break,
                Err(QueueError::Full) => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }

        let result = self.dispatcher.join().await;
        match &result {
            Ok(frames) => info!("Control session closed after {} frames", frames),
            Err(e) => error!("Control session ended with error: {}", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Point;
    use crate::mapping::{GestureDescriptor, KeyBinding, Modifiers, MouseButton};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, AsyncWrite};

    const KEY: u32 = 32;

    fn keymap() -> KeyMap {
        KeyMap {
            keys: vec![KeyBinding {
                code: KEY,
                ctrl: false,
                gesture: GestureDescriptor::Point(Point::new(100, 200)),
            }],
            ..KeyMap::default()
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            frame_size: FrameSize::new(1080, 2340),
            ..SessionSettings::default()
        }
    }

    #[tokio::test]
    async fn two_fingers_reach_the_wire() {
        let (client, mut device) = tokio::io::duplex(4096);
        let (mut router, session) =
            ControlSession::start(Box::new(client), &keymap(), &settings()).unwrap();

        router.key_down(KEY, Modifiers::NONE, false);
        router.mouse_down(MouseButton::Left, Point::new(50, 50));
        let frames = session.shutdown(router).await.unwrap();
        assert_eq!(frames, 4);

        let mut bytes = Vec::new();
        device.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes.len(), 13 + 18 + 18 + 13);
        assert_eq!(
            &bytes[..13],
            &[2, 0x00, 0x00, 0x01, 0x00, 100, 0x00, 200, 0x00, 0x04, 0x38, 0x09, 0x24]
        );
        assert_eq!(&bytes[13..17], &[2, 0x01, 0x05, 0x02]);
        assert_eq!(&bytes[22..27], &[0x00, 50, 0x00, 50, 0x01]);
        // the last frame lifts the remaining finger
        assert_eq!(&bytes[49..53], &[2, 0x00, 0x01, 0x01]);
    }

    struct FailingSink;

    impl AsyncWrite for FailingSink {
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
    async fn sink_failure_closes_the_session() {
        let (mut router, session) =
            ControlSession::start(Box::new(FailingSink), &keymap(), &settings()).unwrap();

        router.key_down(KEY, Modifiers::NONE, false);
        session.closed().await;
        assert!(session.is_closed());

        let result = session.shutdown(router).await;
        assert!(matches!(result, Err(ControlError::SinkWrite(_))));
    }

    #[test]
    fn start_needs_a_runtime() {
        let (client, _device) = tokio::io::duplex(64);
        let result = ControlSession::start(Box::new(client), &keymap(), &settings());
        assert!(matches!(result, Err(ControlError::Dispatcher(_))));
    }
}
