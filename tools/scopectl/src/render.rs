//! Text rendering of the trace router output

use colored::*;
use scope_link::plot::{PlotSurface, CH1_LINE};
use std::io::Write;

const DEFAULT_WIDTH: usize = 61;

/// Draws one terminal row per reading
///
/// Points added between two [`TerminalSurface::render_row`] calls are drawn
/// on the same row; the y axis spans `-y_limit..=y_limit`.
pub struct TerminalSurface<W: Write> {
    out: W,
    y_limit: f64,
    width: usize,
    row: Vec<(usize, f64, f64)>,
    sweeps: u64,
}

impl TerminalSurface<std::io::Stdout> {
    pub fn stdout(y_limit: f64) -> Self {
        Self::new(std::io::stdout(), y_limit, DEFAULT_WIDTH)
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, y_limit: f64, width: usize) -> Self {
        Self {
            out,
            y_limit,
            width: width.max(3),
            row: Vec::with_capacity(2),
            sweeps: 0,
        }
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Column of `y`, clamped to the plot width
    fn column(&self, y: f64) -> usize {
        let span = self.width - 1;
        let normalized = ((y + self.y_limit) / (2.0 * self.y_limit)).clamp(0.0, 1.0);
        (normalized * span as f64).round() as usize
    }

    /// Write the pending points as one row
    pub fn render_row(&mut self) -> std::io::Result<()> {
        if self.row.is_empty() {
            return Ok(());
        }

        let mut cells = vec![' '; self.width];
        cells[self.width / 2] = '|';
        for &(line, _, y) in &self.row {
            let marker = if line == CH1_LINE { '1' } else { '2' };
            cells[self.column(y)] = marker;
        }
        let plot: String = cells
            .into_iter()
            .map(|c| match c {
                '1' => "●".yellow().to_string(),
                '2' => "●".cyan().to_string(),
                '|' => "|".dimmed().to_string(),
                other => other.to_string(),
            })
            .collect();

        let x = self.row[0].1;
        let values: Vec<String> = self.row.iter().map(|&(_, _, y)| format!("{y:>6.2}")).collect();

        writeln!(self.out, "{x:>8.3} {} {plot}", values.join(" "))?;
        self.row.clear();
        Ok(())
    }
}

impl<W: Write> PlotSurface for TerminalSurface<W> {
    fn add_point(&mut self, line: usize, x: f64, y: f64) {
        self.row.push((line, x, y));
    }

    fn clear(&mut self) {
        self.row.clear();
        self.sweeps += 1;
        // a failed separator write is not worth aborting the stream
        let _ = writeln!(self.out, "{}", format!("-- sweep {} --", self.sweeps).dimmed());
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use scope_link::plot::CH2_LINE;

    fn surface() -> TerminalSurface<Vec<u8>> {
        colored::control::set_override(false);
        TerminalSurface::new(Vec::new(), 3.5, 15)
    }

    #[test]
    fn test_column_mapping() {
        let s = surface();
        assert_eq!(s.column(-3.5), 0);
        assert_eq!(s.column(0.0), 7);
        assert_eq!(s.column(3.5), 14);
        assert_eq!(s.column(100.0), 14);
    }

    #[test]
    fn test_row_rendering() {
        let mut s = surface();
        s.add_point(CH1_LINE, 0.025, 3.5);
        s.add_point(CH2_LINE, 0.025, -3.5);
        s.render_row().unwrap();
        s.render_row().unwrap();

        let text = String::from_utf8(s.out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("   0.025   3.50  -3.50 ●"));
        assert!(text.trim_end().ends_with('●'));
    }

    #[test]
    fn test_clear_counts_sweeps() {
        let mut s = surface();
        s.add_point(CH1_LINE, 0.0, 1.0);
        s.clear();
        s.render_row().unwrap();
        assert_eq!(s.sweeps(), 1);
        assert_eq!(String::from_utf8(s.out).unwrap(), "-- sweep 1 --\n");
    }
}
