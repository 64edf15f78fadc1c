//! Composite all the effect canvases and render them to the user's terminal.

use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::sync::mpsc;

use termwiz::surface::Surface as TermwizSurface;
use termwiz::surface::{Change as TermwizChange, Position as TermwizPosition};
use termwiz::terminal::buffered::BufferedTerminal;
use termwiz::terminal::{ScreenSize, Terminal as TermwizTerminal};

use crate::canvas::{blend_over, Canvas, Colour, WHITE};
use crate::run::FrameUpdate;
use crate::shared_state::SharedState;

/// The number of microseconds in a second.
pub const ONE_MICROSECOND: u64 = 1_000_000;

/// The card's background colour, a deep midnight blue.
pub const BACKGROUND: Colour = (0.055, 0.066, 0.12, 1.0);

/// `Renderer`
pub struct Renderer {
    /// Shared app state.
    pub state: Arc<SharedState>,
    /// The terminal's width.
    pub width: u16,
    /// The terminal's height.
    pub height: u16,
    /// The most recent canvas from every effect.
    layers: Vec<Canvas>,
}

impl Renderer {
    /// Create a renderer to render to a user's terminal.
    pub fn new(state: Arc<SharedState>) -> Result<Self> {
        let size = Self::get_users_tty_size()?;
        Ok(Self {
            state,
            width: size.cols.try_into()?,
            height: size.rows.try_into()?,
            layers: Vec::new(),
        })
    }

    /// Instantiate and run.
    pub fn start(
        state: Arc<SharedState>,
        protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> (
        tokio::task::JoinHandle<Result<()>>,
        mpsc::Sender<FrameUpdate>,
    ) {
        let (frames_tx, frames_rx) = mpsc::channel(256);
        let protocol_rx = protocol_tx.subscribe();
        let handle = tokio::spawn(async move {
            match Self::new(Arc::clone(&state)) {
                Ok(mut renderer) => {
                    let result = renderer
                        .run(frames_rx, protocol_rx, protocol_tx.clone())
                        .await;
                    if let Err(error) = result {
                        crate::run::broadcast_protocol_end(&protocol_tx);
                        return Err(error);
                    }
                }
                Err(error) => {
                    crate::run::broadcast_protocol_end(&protocol_tx);
                    return Err(error);
                }
            }
            Ok(())
        });

        (handle, frames_tx)
    }

    /// We need this just because I can't figure out how to pass `Box<dyn Terminal>` to
    /// `BufferedTerminal::new()`.
    fn get_termwiz_terminal() -> Result<impl TermwizTerminal> {
        let capabilities = termwiz::caps::Capabilities::new_from_env()?;
        Ok(termwiz::terminal::new_terminal(capabilities)?)
    }

    /// Just for initialisation.
    pub fn get_users_tty_size() -> Result<ScreenSize> {
        let mut terminal = Self::get_termwiz_terminal()?;
        Ok(terminal.get_screen_size()?)
    }

    /// The main render loop.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "This is caused by the `tokio::select!`"
    )]
    pub async fn run(
        &mut self,
        mut frames_rx: mpsc::Receiver<FrameUpdate>,
        mut protocol_rx: tokio::sync::broadcast::Receiver<crate::run::Protocol>,
        protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> Result<()> {
        let mut terminal = Self::get_termwiz_terminal()?;
        terminal.set_raw_mode()?;
        terminal.enter_alternate_screen()?;
        let mut composited_terminal = BufferedTerminal::new(terminal)?;

        if let Err(error) = protocol_tx.send(crate::run::Protocol::Initialised("renderer".into()))
        {
            tracing::debug!("Announcing renderer startup: {error:?}");
        }

        loop {
            tokio::select! {
                maybe_update = frames_rx.recv() => {
                    let Some(update) = maybe_update else {
                        break;
                    };
                    self.handle_resize(&mut composited_terminal, &protocol_tx).await?;
                    match update {
                        FrameUpdate::Layer(canvas) => self.store_layer(canvas),
                    }
                    self.render(&mut composited_terminal)?;
                },
                result = protocol_rx.recv() => {
                    if matches!(result, Ok(crate::run::Protocol::End)) {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Renderer loop finished, restoring the user's terminal");
        composited_terminal.terminal().exit_alternate_screen()?;
        composited_terminal.terminal().set_cooked_mode()?;
        Ok(())
    }

    /// Keep the most recent canvas per effect.
    fn store_layer(&mut self, canvas: Canvas) {
        match self
            .layers
            .iter_mut()
            .find(|existing| existing.id == canvas.id)
        {
            Some(existing) => *existing = canvas,
            None => self.layers.push(canvas),
        }
    }

    /// Composite the current layers and put them on the user's terminal.
    fn render(
        &mut self,
        composited_terminal: &mut BufferedTerminal<impl TermwizTerminal>,
    ) -> Result<()> {
        let frame = composite(
            &self.layers,
            self.width.into(),
            self.height.into(),
            BACKGROUND,
        );
        composited_terminal.draw_from_screen(&frame, 0, 0);
        composited_terminal.flush()?;
        Ok(())
    }

    /// Get the user's current terminal size and propagate it.
    async fn handle_resize(
        &mut self,
        composited_terminal: &mut BufferedTerminal<impl TermwizTerminal>,
        protocol_tx: &tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> Result<()> {
        let size = composited_terminal.terminal().get_screen_size()?;
        let width: u16 = size.cols.try_into()?;
        let height: u16 = size.rows.try_into()?;
        if width == self.width && height == self.height {
            return Ok(());
        }

        tracing::debug!("Renderer caught a resize: {width}x{height}");
        self.width = width;
        self.height = height;
        composited_terminal.resize(size.cols, size.rows);
        self.state.set_tty_size(width, height).await;
        if let Err(error) = protocol_tx.send(crate::run::Protocol::Resize { width, height }) {
            tracing::error!("Couldn't announce resize: {error:?}");
        }
        Ok(())
    }
}

/// Composite canvases, lowest layer first, into a Termwiz surface of half-block pixels and text.
#[must_use]
pub fn composite(
    layers: &[Canvas],
    columns: usize,
    rows: usize,
    background: Colour,
) -> TermwizSurface {
    let mut pixels: Vec<Colour> = vec![background; columns * rows * 2];
    let mut text_cells: std::collections::HashMap<(usize, usize), TextCell> =
        std::collections::HashMap::new();

    let mut ordered: Vec<&Canvas> = layers.iter().collect();
    ordered.sort_by_key(|canvas| canvas.layer);

    for canvas in ordered {
        if canvas.opacity <= f32::EPSILON {
            continue;
        }
        for y in 0..canvas.height().min(rows * 2) {
            for x in 0..canvas.width().min(columns) {
                if let Some(mut colour) = canvas.pixel(x, y) {
                    colour.3 *= canvas.opacity;
                    if let Some(slot) = pixels.get_mut(y * columns + x) {
                        *slot = blend_over(Some(*slot), colour);
                    }
                }
            }
        }
        for span in canvas.texts() {
            for (offset, character) in span.text.chars().enumerate() {
                let column = span.column + offset;
                if column >= columns || span.row >= rows {
                    continue;
                }
                text_cells.insert(
                    (span.row, column),
                    TextCell {
                        character,
                        foreground: span.foreground,
                        background: span.background,
                    },
                );
            }
        }
    }

    let mut surface = TermwizSurface::new(columns, rows);
    for row in 0..rows {
        for column in 0..columns {
            surface.add_change(TermwizChange::CursorPosition {
                x: TermwizPosition::Absolute(column),
                y: TermwizPosition::Absolute(row),
            });
            let upper = pixels
                .get(row * 2 * columns + column)
                .copied()
                .unwrap_or(background);
            let lower = pixels
                .get((row * 2 + 1) * columns + column)
                .copied()
                .unwrap_or(background);

            match text_cells.get(&(row, column)) {
                Some(cell) => {
                    let text_background = cell.background.unwrap_or_else(|| average(upper, lower));
                    let text_foreground = cell.foreground.unwrap_or(WHITE);
                    surface.add_changes(vec![
                        make_fg_colour(text_foreground),
                        make_bg_colour(text_background),
                    ]);
                    surface.add_change(cell.character.to_string());
                }
                None => {
                    surface.add_changes(vec![make_fg_colour(upper), make_bg_colour(lower)]);
                    surface.add_change("▀");
                }
            }
        }
    }
    surface
}

/// A character cell resolved during compositing.
struct TextCell {
    /// The character.
    character: char,
    /// Explicit foreground, or the default.
    foreground: Option<Colour>,
    /// Explicit background, or whatever pixels are underneath.
    background: Option<Colour>,
}

/// The midpoint of two colours, used as the backdrop for text without an explicit background.
fn average(first: Colour, second: Colour) -> Colour {
    (
        (first.0 + second.0) / 2.0,
        (first.1 + second.1) / 2.0,
        (first.2 + second.2) / 2.0,
        (first.3 + second.3) / 2.0,
    )
}

/// Make a Termwiz colour attribute.
#[must_use]
pub const fn make_colour_attribute(colour: Colour) -> termwiz::color::ColorAttribute {
    termwiz::color::ColorAttribute::TrueColorWithDefaultFallback(termwiz::color::SrgbaTuple(
        colour.0, colour.1, colour.2, colour.3,
    ))
}

/// Make a Termwiz foreground colour change.
#[must_use]
pub const fn make_fg_colour(colour: Colour) -> TermwizChange {
    let colour_attribute = make_colour_attribute(colour);
    TermwizChange::Attribute(termwiz::cell::AttributeChange::Foreground(colour_attribute))
}

/// Make a Termwiz background colour change.
#[must_use]
pub const fn make_bg_colour(colour: Colour) -> TermwizChange {
    let colour_attribute = make_colour_attribute(colour);
    TermwizChange::Attribute(termwiz::cell::AttributeChange::Background(colour_attribute))
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::canvas::BLACK;

    #[test]
    fn empty_composite_is_all_background() {
        let mut frame = composite(&[], 2, 1, BLACK);
        let cells = frame.screen_cells();
        assert_eq!(cells[0][0].str(), "▀");
        assert_eq!(
            cells[0][0].attrs().foreground(),
            make_colour_attribute(BLACK)
        );
    }

    #[test]
    fn single_pixel_lands_in_the_upper_half() {
        let mut canvas = Canvas::new("test".into(), 2, 1, 0);
        canvas.paint_pixel(0, 0, WHITE);
        let mut frame = composite(&[canvas], 2, 1, BLACK);
        let cells = frame.screen_cells();
        assert_eq!(cells[0][0].str(), "▀");
        assert_eq!(
            cells[0][0].attrs().foreground(),
            make_colour_attribute(WHITE)
        );
        assert_eq!(
            cells[0][0].attrs().background(),
            make_colour_attribute(BLACK)
        );
    }

    #[test]
    fn higher_layers_paint_over_lower_ones() {
        let mut below = Canvas::new("below".into(), 1, 1, 0);
        below.paint_pixel(0, 0, WHITE);
        let mut above = Canvas::new("above".into(), 1, 1, 10);
        above.paint_pixel(0, 0, (1.0, 0.0, 0.0, 1.0));
        // Deliberately store them out of order.
        let mut frame = composite(&[above, below], 1, 1, BLACK);
        let cells = frame.screen_cells();
        assert_eq!(
            cells[0][0].attrs().foreground(),
            make_colour_attribute((1.0, 0.0, 0.0, 1.0))
        );
    }

    #[test]
    fn text_wins_over_pixels() {
        let mut canvas = Canvas::new("test".into(), 4, 1, 0);
        canvas.paint_pixel(0, 0, WHITE);
        canvas.paint_text(0, 0, "hi".into(), Some(BLACK), Some(WHITE));
        let mut frame = composite(&[canvas], 4, 1, BLACK);
        let cells = frame.screen_cells();
        assert_eq!(cells[0][0].str(), "h");
        assert_eq!(cells[0][1].str(), "i");
        assert_eq!(cells[0][2].str(), "▀");
    }

    #[test]
    fn fully_transparent_canvases_are_skipped() {
        let mut canvas = Canvas::new("test".into(), 1, 1, 0);
        canvas.paint_pixel(0, 0, WHITE);
        canvas.opacity = 0.0;
        let mut frame = composite(&[canvas], 1, 1, BLACK);
        let cells = frame.screen_cells();
        assert_eq!(
            cells[0][0].attrs().foreground(),
            make_colour_attribute(BLACK)
        );
    }
}
