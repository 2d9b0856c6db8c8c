// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based photo box
//!
//! Renders the live view to the terminal using Unicode half-block characters
//! for improved vertical resolution. The latest frame is polled on a ~16 ms
//! timer; captures and resets run on a worker thread so the preview keeps
//! updating while the camera is busy.

use crate::backends::camera::{CameraBackendManager, Frame};
use crate::constants::timing::TERMINAL_POLL_INTERVAL;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::mpsc;
use tracing::{error, info};

/// Run the terminal viewer on an initialized camera
pub fn run(camera: CameraBackendManager) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &camera);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    camera.shutdown();
    result
}

/// Work running off the UI thread; reports a status line when done
struct PendingJob {
    label: &'static str,
    result: mpsc::Receiver<String>,
}

fn spawn_job<F>(label: &'static str, camera: &CameraBackendManager, job: F) -> PendingJob
where
    F: FnOnce(&CameraBackendManager) -> String + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let camera = camera.clone();
    std::thread::spawn(move || {
        let _ = sender.send(job(&camera));
    });
    PendingJob {
        label,
        result: receiver,
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    camera: &CameraBackendManager,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut frame_widget = FrameWidget::new();
    let mut message = match camera.start_live_view() {
        Ok(()) => help_message(),
        Err(e) => {
            error!(error = %e, "Live view did not start");
            format!("Live view unavailable: {}", e)
        }
    };
    let mut pending: Option<PendingJob> = None;
    let mut last_sequence = None;

    loop {
        if let Some(frame) = camera.latest_frame()
            && last_sequence != Some(frame.sequence)
        {
            last_sequence = Some(frame.sequence);
            frame_widget.update_frame(frame);
        }

        if let Some(job) = &pending {
            match job.result.try_recv() {
                Ok(line) => {
                    message = line;
                    pending = None;
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    message = format!("{} aborted", job.label);
                    pending = None;
                }
                Err(mpsc::TryRecvError::Empty) => {}
            }
        }

        let status_line = match (&pending, camera.try_status()) {
            (Some(job), _) => format!("{}... | {}", job.label, message),
            (None, Some(status)) => {
                let mut line = format!(
                    "[{}{}{}] {}",
                    status.mode,
                    if status.live_view_active { " live" } else { "" },
                    if status.studio_mode { " studio" } else { "" },
                    message
                );
                if let Some(reason) = status.last_error {
                    line.push_str(&format!(" | {}", reason));
                }
                line
            }
            (None, None) => message.clone(),
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(&frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(StatusBar { message: &status_line }, status_area);
        })?;

        if event::poll(TERMINAL_POLL_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('p') if pending.is_none() => {
                    pending = Some(spawn_job("Capturing", camera, |camera| {
                        match camera.capture(None) {
                            Ok(photo) => match photo.forwarded_to {
                                Some(copy) => format!(
                                    "Saved: {} (forwarded to {})",
                                    photo.path.display(),
                                    copy.display()
                                ),
                                None => format!("Saved: {}", photo.path.display()),
                            },
                            Err(e) => {
                                error!(error = %e, "Capture failed");
                                format!("Error: {}", e)
                            }
                        }
                    }));
                }
                KeyCode::Char('s') if pending.is_none() => {
                    if camera.is_live_view_active() {
                        camera.stop_live_view();
                        message = "Live view stopped".into();
                    } else {
                        message = match camera.start_live_view() {
                            Ok(()) => help_message(),
                            Err(e) => format!("Error: {}", e),
                        };
                    }
                }
                KeyCode::Char('r') if pending.is_none() => {
                    pending = Some(spawn_job("Resetting", camera, |camera| {
                        match camera.reset_connection() {
                            Ok(()) => {
                                let _ = camera.start_live_view();
                                "Connection reset".to_string()
                            }
                            Err(e) => format!("Error: {}", e),
                        }
                    }));
                }
                KeyCode::Char('h') => message = help_message(),
                _ => {}
            }
        }
    }

    info!("Leaving terminal viewer");
    Ok(())
}

fn help_message() -> String {
    "p: Take picture | s: Toggle live view | r: Reset | q/Ctrl+C: Quit".to_string()
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget {
    frame: Option<Frame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = &self.frame else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 || area.width == 0 || area.height == 0 {
            return;
        }

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = width as f64 / height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = width as f64 / display_width as f64;
        let y_scale = height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;
                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &Frame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    let [r, g, b] = frame.image.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Single-line status bar
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = ratatui::style::Style::default()
            .fg(Color::Black)
            .bg(Color::Gray);
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.reset();
                cell.set_style(style);
            }
        }
        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(area.x, area.y, text, style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_frame_widget_fills_area() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let mut widget = FrameWidget::new();
        widget.update_frame(Frame::new(image, 1));

        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);

        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(200, 10, 10));
    }

    #[test]
    fn test_placeholder_without_frame() {
        let area = Rect::new(0, 0, 30, 3);
        let mut buf = Buffer::empty(area);
        (&FrameWidget::new()).render(area, &mut buf);
        let row: String = (0..30)
            .map(|x| buf.cell((x, 1)).unwrap().symbol().to_string())
            .collect();
        assert!(row.contains("Waiting for camera"));
    }
}
