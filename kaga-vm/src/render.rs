//! Dedicated rendering task.
//!
//! The protocol core hands pixels to a thread that owns the actual surface
//! (and, with the `gui` feature, the window). Draw operations are
//! fire-and-forget messages; `resize` is a request/acknowledge round trip,
//! and the acknowledgment is the only thing the core ever blocks on. The
//! request channel is FIFO, so an acknowledged resize implies every draw
//! sent before it has been applied.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::color::Rgb;
use crate::fb::{Cell, FramebufferSink, PixelBuffer, Rect};
use crate::font::Font;
use crate::keyboard::KeyEvent;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering task failed to start: {0}")]
    Startup(String),
}

/// Presenter plugged into the rendering task: pushes the frame at the host
/// (a window, a recording, nothing at all) and reports key events back.
pub trait Present {
    /// Show the current frame. Returning false shuts the task down (e.g.
    /// the window was closed).
    fn present(&mut self, frame: &PixelBuffer) -> bool;

    /// Collect pending key events into `out`.
    fn poll_keys(&mut self, out: &mut Vec<KeyEvent>);
}

/// Presenter that renders to nowhere; used when no window is wanted.
pub struct Headless;

impl Present for Headless {
    fn present(&mut self, _frame: &PixelBuffer) -> bool {
        true
    }

    fn poll_keys(&mut self, _out: &mut Vec<KeyEvent>) {}
}

enum Request {
    Fill(Rect, Rgb),
    Glyph(Cell, char, Font, Rgb, Rgb),
    Resize(u32, u32, mpsc::Sender<()>),
}

/// Core-side handle to the rendering task; this is the framebuffer sink the
/// display state machine writes into.
pub struct RenderHandle {
    tx: mpsc::Sender<Request>,
}

impl FramebufferSink for RenderHandle {
    fn fill(&mut self, rect: Rect, color: Rgb) {
        let _ = self.tx.send(Request::Fill(rect, color));
    }

    fn draw_glyph(&mut self, cell: Cell, ch: char, font: Font, fg: Rgb, bg: Rgb) {
        let _ = self.tx.send(Request::Glyph(cell, ch, font, fg, bg));
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Request::Resize(width, height, ack_tx)).is_ok() {
            // Block until the task has reallocated the surface. If the task
            // died (window closed mid-command) there is nothing to wait for.
            if ack_rx.recv().is_err() {
                log::warn!("[RENDER] resize not acknowledged, task is gone");
            }
        }
    }
}

/// Spawn the rendering task. The presenter is constructed on the task's own
/// thread (window handles are rarely `Send`); a construction error is
/// reported back from `spawn`.
pub fn spawn<P, F>(
    factory: F,
    width: u32,
    height: u32,
    keys: mpsc::Sender<KeyEvent>,
) -> Result<RenderHandle, RenderError>
where
    P: Present + 'static,
    F: FnOnce(u32, u32) -> Result<P, RenderError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Request>();
    let (startup_tx, startup_rx) = mpsc::channel();

    thread::spawn(move || {
        let mut presenter = match factory(width, height) {
            Ok(p) => {
                let _ = startup_tx.send(Ok(()));
                p
            }
            Err(e) => {
                let _ = startup_tx.send(Err(e));
                return;
            }
        };
        let mut frame = PixelBuffer::new(width, height);
        let mut pending_keys = Vec::new();

        loop {
            // Wait a frame's worth for work, then present regardless.
            match rx.recv_timeout(Duration::from_millis(16)) {
                Ok(req) => {
                    apply(&mut frame, req);
                    while let Ok(req) = rx.try_recv() {
                        apply(&mut frame, req);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if !presenter.present(&frame) {
                log::debug!("[RENDER] presenter closed, shutting down");
                break;
            }
            presenter.poll_keys(&mut pending_keys);
            for key in pending_keys.drain(..) {
                if keys.send(key).is_err() {
                    return;
                }
            }
        }
    });

    startup_rx
        .recv()
        .unwrap_or_else(|_| Err(RenderError::Startup("rendering thread panicked".into())))?;
    Ok(RenderHandle { tx })
}

fn apply(frame: &mut PixelBuffer, req: Request) {
    match req {
        Request::Fill(rect, color) => frame.fill(rect, color),
        Request::Glyph(cell, ch, font, fg, bg) => frame.draw_glyph(cell, ch, font, fg, bg),
        Request::Resize(width, height, ack) => {
            frame.resize(width, height);
            let _ = ack.send(());
        }
    }
}
