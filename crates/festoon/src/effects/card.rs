//! The greeting card itself: the frame, the title, and the message hidden behind the reveal.

use color_eyre::eyre::Result;

use super::driver::Driver;

/// The title's soft rose colour.
const TITLE_COLOUR: crate::canvas::Colour = (1.0, 0.84, 0.88, 1.0);

/// Body text colour.
const TEXT_COLOUR: crate::canvas::Colour = (0.92, 0.93, 0.97, 1.0);

/// De-emphasised hint text colour.
const DIM_COLOUR: crate::canvas::Colour = (0.55, 0.58, 0.7, 1.0);

/// The card's border colour.
const BORDER_COLOUR: crate::canvas::Colour = (0.45, 0.48, 0.65, 1.0);

/// The card effect: draws the frame and handles the reveal action.
pub struct Card {
    /// The base effect struct.
    driver: Driver,
    /// Shared app state.
    state: std::sync::Arc<crate::shared_state::SharedState>,
    /// Only re-render when something actually changed.
    needs_render: bool,
}

impl Card {
    /// Everything else is drawn over the card.
    const LAYER: i16 = 0;

    /// Our main entrypoint.
    pub async fn start(
        state: std::sync::Arc<crate::shared_state::SharedState>,
        output: tokio::sync::mpsc::Sender<crate::run::FrameUpdate>,
    ) -> Result<()> {
        let mut card = Self {
            driver: Driver::new("card".to_owned(), Self::LAYER, output),
            state: std::sync::Arc::clone(&state),
            needs_render: true,
        };
        let config = state.config.read().await.clone();
        card.driver.frame_rate = config.frame_rate;
        let tty_size = state.get_tty_size().await;
        card.driver.set_tty_size(tty_size.width, tty_size.height);

        let mut protocol = state.protocol_tx.subscribe();

        if let Err(error) = state
            .protocol_tx
            .send(crate::run::Protocol::Initialised("card".into()))
        {
            tracing::debug!("Announcing card startup: {error:?}");
        }

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "This is caused by the `tokio::select!`"
        )]
        loop {
            tokio::select! {
                () = card.driver.sleep_until_next_frame_tick(), if card.needs_render => {
                    card.render().await?;
                },
                result = protocol.recv() => {
                    match result {
                        Ok(crate::run::Protocol::End) => break,
                        Ok(crate::run::Protocol::Action(crate::input::Action::Reveal)) => {
                            card.toggle_reveal().await;
                        }
                        Ok(message) => {
                            if matches!(
                                message,
                                crate::run::Protocol::Resize { .. }
                                    | crate::run::Protocol::Config(_)
                            ) {
                                card.needs_render = true;
                            }
                            card.driver.handle_common_protocol_messages(&message);
                        }
                        Err(error) => tracing::error!("Receiving protocol message: {error:?}"),
                    }
                }
            }
        }

        Ok(())
    }

    /// Open or close the message. Opening also kicks off the celebration: the chime here, the
    /// snow in its own task via the broadcast.
    async fn toggle_reveal(&mut self) {
        let is_open = !self.state.get_is_revealed().await;
        self.state.set_is_revealed(is_open).await;
        tracing::debug!("Card revealed: {is_open}");

        if is_open {
            crate::chime::play();
        }
        if let Err(error) = self
            .state
            .protocol_tx
            .send(crate::run::Protocol::Reveal(is_open))
        {
            tracing::trace!("Announcing reveal: {error:?}");
        }
        self.needs_render = true;
    }

    /// Draw the card frame and whichever face of the card is showing.
    async fn render(&mut self) -> Result<()> {
        if !self.driver.is_ready() {
            return Ok(());
        }

        self.driver.initialise_canvas();
        let columns = usize::from(self.driver.width);
        let rows = usize::from(self.driver.height);
        let greeting = self.state.config.read().await.greeting.clone();
        let is_revealed = self.state.get_is_revealed().await;

        self.paint_border(columns, rows);
        self.paint_centred(1, &greeting.title, Some(TITLE_COLOUR));

        if is_revealed {
            for (offset, line) in wrap_message(&greeting.message, columns.saturating_sub(8))
                .iter()
                .enumerate()
            {
                self.paint_centred(3 + offset, line, Some(TEXT_COLOUR));
            }
        } else {
            let middle = rows / 2;
            self.paint_centred(middle, "A little surprise is waiting...", Some(TEXT_COLOUR));
            self.paint_centred(middle + 2, "press s to open", Some(DIM_COLOUR));
        }

        self.paint_centred(
            rows.saturating_sub(2),
            "s reveal · ←/→ photos · f fullscreen · q quit",
            Some(DIM_COLOUR),
        );

        self.needs_render = false;
        self.driver.send_output().await
    }

    /// A rounded box around the whole viewport.
    fn paint_border(&mut self, columns: usize, rows: usize) {
        if columns < 2 || rows < 2 {
            return;
        }
        let horizontal = "─".repeat(columns.saturating_sub(2));
        self.driver.canvas.paint_text(
            0,
            0,
            format!("╭{horizontal}╮"),
            None,
            Some(BORDER_COLOUR),
        );
        self.driver.canvas.paint_text(
            0,
            rows - 1,
            format!("╰{horizontal}╯"),
            None,
            Some(BORDER_COLOUR),
        );
        for row in 1..rows - 1 {
            self.driver
                .canvas
                .paint_text(0, row, "│".into(), None, Some(BORDER_COLOUR));
            self.driver
                .canvas
                .paint_text(columns - 1, row, "│".into(), None, Some(BORDER_COLOUR));
        }
    }

    /// Paint a line of text centred on the given row.
    fn paint_centred(&mut self, row: usize, text: &str, colour: Option<crate::canvas::Colour>) {
        let columns = usize::from(self.driver.width);
        let length = text.chars().count();
        let column = columns.saturating_sub(length) / 2;
        self.driver
            .canvas
            .paint_text(column, row, text.to_owned(), None, colour);
    }
}

/// Break a message into lines that fit the card. Splits on whitespace only.
fn wrap_message(message: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(8);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in message.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > max_width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn long_messages_wrap_on_whitespace() {
        let lines = wrap_message("one two three four five six", 9);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.chars().count() <= 9);
        }
    }

    #[test]
    fn short_messages_stay_on_one_line() {
        assert_eq!(wrap_message("hello there", 40), vec!["hello there"]);
    }
}
