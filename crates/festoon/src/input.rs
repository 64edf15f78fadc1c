//! Handle all the raw input directly from the end user.

use std::io::Read as _;
use std::io::Write as _;

use color_eyre::eyre::Result;

/// Bytes from STDIN.
pub type BytesFromSTDIN = [u8; 128];

/// Ask the terminal for button-event mouse reporting with SGR encoding.
const ENABLE_MOUSE: &[u8] = b"\x1b[?1002h\x1b[?1006h";

/// A semantic user action, parsed from raw keyboard/mouse events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Action {
    /// Toggle the card's message open or closed.
    Reveal,
    /// Show the next photo.
    NextPhoto,
    /// Show the previous photo.
    PreviousPhoto,
    /// Open or close the fullscreen photo viewer.
    ToggleFullscreen,
    /// Close whatever overlay is currently open.
    CloseOverlay,
    /// The primary pointer button went down.
    PointerDown {
        /// Column of the pointer.
        x: u16,
        /// Row of the pointer.
        y: u16,
    },
    /// The primary pointer button was released.
    PointerUp {
        /// Column of the pointer.
        x: u16,
        /// Row of the pointer.
        y: u16,
    },
}

/// Handle input from the user.
pub struct Input {
    /// The main Festoon protocol channel.
    protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    /// Whether we've seen a pointer press that hasn't been released yet.
    is_pointer_down: bool,
}

impl Input {
    /// Start a thread to listen and parse the end user's STDIN and forward it to the rest of the
    /// application.
    pub fn start(
        protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> std::thread::JoinHandle<std::result::Result<(), color_eyre::eyre::Error>> {
        // The Tokio docs actually suggest using `std::thread` to listen on STDIN for interactive
        // applications.
        std::thread::spawn(move || -> Result<()> {
            let protocol_for_shutdown = protocol_tx.clone();
            let mut input = Self {
                protocol_tx,
                is_pointer_down: false,
            };
            let result = input.consume_stdin();
            if let Err(error) = result {
                crate::run::broadcast_protocol_end(&protocol_for_shutdown);
                return Err(error);
            }
            Ok(())
        })
    }

    /// Listen to the end user's STDIN, parsing the raw bytes into keyboard and mouse events.
    fn consume_stdin(&mut self) -> Result<()> {
        tracing::debug!("Starting to listen on STDIN");
        enable_mouse_reporting();

        let stdin = std::io::stdin();
        let mut reader = std::io::BufReader::new(stdin);
        let mut parser = termwiz::input::InputParser::new();

        loop {
            let mut buffer: BytesFromSTDIN = [0; 128];
            match reader.read(&mut buffer[..]) {
                Ok(read_count) => {
                    if let Some(bytes) = buffer.get(0..read_count) {
                        tracing::trace!("Received STDIN input: {bytes:x?}");
                        parser.parse(bytes, |event| self.handle_event(event), false);
                    } else {
                        tracing::warn!("Couldn't get bytes from STDIN input buffer");
                    }
                }
                Err(err) => {
                    return Err(color_eyre::eyre::Error::new(err));
                }
            }
        }
    }

    /// Map a parsed Termwiz event onto the Festoon protocol.
    fn handle_event(&mut self, event: termwiz::input::InputEvent) {
        #[expect(
            clippy::wildcard_enum_match_arm,
            reason = "We only react to a small set of events"
        )]
        match event {
            termwiz::input::InputEvent::Key(key_event) => self.handle_key_event(&key_event),
            termwiz::input::InputEvent::Mouse(mouse_event) => self.handle_mouse_event(&mouse_event),
            termwiz::input::InputEvent::Resized { cols, rows } => {
                self.send(crate::run::Protocol::Resize {
                    width: cols.try_into().unwrap_or(u16::MAX),
                    height: rows.try_into().unwrap_or(u16::MAX),
                });
            }
            _ => (),
        }
    }

    /// The fixed key map.
    fn handle_key_event(&mut self, key_event: &termwiz::input::KeyEvent) {
        use termwiz::input::KeyCode;

        let is_ctrl_c = matches!(key_event.key, KeyCode::Char('c'))
            && key_event
                .modifiers
                .contains(termwiz::input::Modifiers::CTRL);
        if is_ctrl_c {
            crate::run::broadcast_protocol_end(&self.protocol_tx);
            return;
        }

        #[expect(
            clippy::wildcard_enum_match_arm,
            reason = "Every other key is simply ignored"
        )]
        let maybe_action = match key_event.key {
            KeyCode::Char('q') => {
                crate::run::broadcast_protocol_end(&self.protocol_tx);
                return;
            }
            KeyCode::Char('s' | ' ') | KeyCode::Enter => Some(Action::Reveal),
            KeyCode::RightArrow => Some(Action::NextPhoto),
            KeyCode::LeftArrow => Some(Action::PreviousPhoto),
            KeyCode::Char('f') => Some(Action::ToggleFullscreen),
            KeyCode::Escape => Some(Action::CloseOverlay),
            _ => None,
        };

        if let Some(action) = maybe_action {
            self.send(crate::run::Protocol::Action(action));
        }
    }

    /// Turn raw presses/releases into pointer actions. The gallery derives swipes from the
    /// horizontal distance between a down and its matching up.
    fn handle_mouse_event(&mut self, mouse_event: &termwiz::input::MouseEvent) {
        let is_left_down = mouse_event
            .mouse_buttons
            .contains(termwiz::input::MouseButtons::LEFT);

        if is_left_down && !self.is_pointer_down {
            self.is_pointer_down = true;
            self.send(crate::run::Protocol::Action(Action::PointerDown {
                x: mouse_event.x,
                y: mouse_event.y,
            }));
        } else if !is_left_down && self.is_pointer_down {
            self.is_pointer_down = false;
            self.send(crate::run::Protocol::Action(Action::PointerUp {
                x: mouse_event.x,
                y: mouse_event.y,
            }));
        }
    }

    /// Broadcast, ignoring the error for when all the receivers have already left.
    fn send(&self, message: crate::run::Protocol) {
        if let Err(error) = self.protocol_tx.send(message) {
            tracing::trace!("Sending parsed input: {error:?}");
        }
    }
}

/// Best-effort: a terminal without mouse support just never sends mouse events.
fn enable_mouse_reporting() {
    let result = std::io::stdout()
        .write_all(ENABLE_MOUSE)
        .and_then(|()| std::io::stdout().flush());
    if let Err(error) = result {
        tracing::debug!("Couldn't enable mouse reporting: {error:?}");
    }
}
