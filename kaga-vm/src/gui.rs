//! `minifb` window presenter for the rendering task (behind the `gui`
//! feature).
//!
//! Typed characters arrive through the window's input callback; a small set
//! of non-printable keys is mapped to virtual key codes. Glyphs themselves
//! are whatever the pixel surface drew (placeholder tiles for now).

use std::sync::{Arc, Mutex};

use minifb::{InputCallback, Key, KeyRepeat, Window, WindowOptions};

use crate::fb::PixelBuffer;
use crate::keyboard::{
    KeyEvent, VK_DELETE, VK_DOWN, VK_ESCAPE, VK_LEFT, VK_RIGHT, VK_UP,
};
use crate::render::{Present, RenderError};

struct CharSink(Arc<Mutex<Vec<char>>>);

impl InputCallback for CharSink {
    fn add_char(&mut self, uni_char: u32) {
        if let Some(ch) = char::from_u32(uni_char) {
            self.0.lock().unwrap().push(ch);
        }
    }
}

pub struct WindowPresenter {
    window: Window,
    typed: Arc<Mutex<Vec<char>>>,
}

impl WindowPresenter {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, RenderError> {
        let mut window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions::default(),
        )
        .map_err(|e| RenderError::Startup(e.to_string()))?;
        window.set_target_fps(60);
        let typed = Arc::new(Mutex::new(Vec::new()));
        window.set_input_callback(Box::new(CharSink(typed.clone())));
        Ok(Self { window, typed })
    }

    fn special_key(key: Key) -> Option<KeyEvent> {
        let code = match key {
            Key::Escape => VK_ESCAPE,
            Key::Left => VK_LEFT,
            Key::Up => VK_UP,
            Key::Right => VK_RIGHT,
            Key::Down => VK_DOWN,
            Key::Delete => VK_DELETE,
            // Enter and Backspace reach the receiver as typed control
            // characters, the way a text field reports them.
            Key::Enter => return Some(KeyEvent::Char('\n')),
            Key::Backspace => return Some(KeyEvent::Char('\u{8}')),
            _ => return None,
        };
        Some(KeyEvent::Special(code))
    }
}

impl Present for WindowPresenter {
    fn present(&mut self, frame: &PixelBuffer) -> bool {
        if !self.window.is_open() {
            return false;
        }
        if let Err(e) = self.window.update_with_buffer(
            frame.data(),
            frame.width() as usize,
            frame.height() as usize,
        ) {
            log::warn!("[GUI] frame update failed: {}", e);
            return false;
        }
        true
    }

    fn poll_keys(&mut self, out: &mut Vec<KeyEvent>) {
        for ch in self.typed.lock().unwrap().drain(..) {
            out.push(KeyEvent::Char(ch));
        }
        for key in self.window.get_keys_pressed(KeyRepeat::Yes) {
            if let Some(event) = Self::special_key(key) {
                out.push(event);
            }
        }
    }
}
