//! Mapping readings onto a plot
//!
//! Rendering belongs to the caller; this module only decides where each
//! reading lands. In time mode both channels share a sweeping x axis that
//! wraps after `x_limit` seconds and clears the surface, like a scope in
//! roll-off mode. In XY mode channel 1 drives x and channel 2 drives y.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::Reading;
use crate::config::DisplayConfig;
use crate::error::ScopeError;

/// Line index used for channel 1 (and for the XY trace)
pub const CH1_LINE: usize = 0;
/// Line index used for channel 2
pub const CH2_LINE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlotMode {
    /// Voltage against time, one line per channel
    #[default]
    #[serde(rename = "time")]
    TimeSeries,
    /// Channel 2 against channel 1
    #[serde(rename = "xy")]
    Xy,
}

impl fmt::Display for PlotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotMode::TimeSeries => write!(f, "time"),
            PlotMode::Xy => write!(f, "xy"),
        }
    }
}

impl FromStr for PlotMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" | "t" => Ok(PlotMode::TimeSeries),
            "xy" => Ok(PlotMode::Xy),
            other => Err(ScopeError::config(format!(
                "unknown plot mode '{other}' (expected time or xy)"
            ))),
        }
    }
}

/// Anything that can draw points on numbered lines
pub trait PlotSurface {
    fn add_point(&mut self, line: usize, x: f64, y: f64);
    fn clear(&mut self);
}

/// Routes readings to a [`PlotSurface`]
#[derive(Debug, Clone)]
pub struct TraceRouter {
    mode: PlotMode,
    x_limit: f64,
    sample_period: f64,
    t: f64,
}

impl TraceRouter {
    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            mode: display.mode,
            x_limit: display.x_limit,
            sample_period: display.sample_period,
            t: 0.0,
        }
    }

    pub fn mode(&self) -> PlotMode {
        self.mode
    }

    /// Current sweep position in seconds
    pub fn time(&self) -> f64 {
        self.t
    }

    /// Change mode; the surface is cleared and the sweep restarts
    pub fn set_mode<S: PlotSurface + ?Sized>(&mut self, mode: PlotMode, surface: &mut S) {
        self.mode = mode;
        self.t = 0.0;
        surface.clear();
    }

    pub fn route<S: PlotSurface + ?Sized>(&mut self, reading: Reading, surface: &mut S) {
        match self.mode {
            PlotMode::TimeSeries => {
                if self.t >= self.x_limit {
                    self.t %= self.x_limit;
                    surface.clear();
                }
                surface.add_point(CH1_LINE, self.t, reading.ch1);
                surface.add_point(CH2_LINE, self.t, reading.ch2);
                self.t += self.sample_period;
            },
            PlotMode::Xy => surface.add_point(CH1_LINE, reading.ch1, reading.ch2),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        points: Vec<(usize, f64, f64)>,
        clears: usize,
    }

    impl PlotSurface for Recorder {
        fn add_point(&mut self, line: usize, x: f64, y: f64) {
            self.points.push((line, x, y));
        }

        fn clear(&mut self) {
            self.points.clear();
            self.clears += 1;
        }
    }

    fn display(mode: PlotMode) -> DisplayConfig {
        DisplayConfig {
            x_limit: 1.0,
            sample_period: 0.25,
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_time_mode_routes_both_channels() {
        let mut router = TraceRouter::new(&display(PlotMode::TimeSeries));
        let mut surface = Recorder::default();

        router.route(Reading { ch1: 1.0, ch2: 2.0 }, &mut surface);
        router.route(Reading { ch1: 3.0, ch2: 4.0 }, &mut surface);

        assert_eq!(
            surface.points,
            vec![
                (CH1_LINE, 0.0, 1.0),
                (CH2_LINE, 0.0, 2.0),
                (CH1_LINE, 0.25, 3.0),
                (CH2_LINE, 0.25, 4.0),
            ]
        );
        assert_eq!(router.time(), 0.5);
    }

    #[test]
    fn test_time_mode_wraps_and_clears() {
        let mut router = TraceRouter::new(&display(PlotMode::TimeSeries));
        let mut surface = Recorder::default();

        for _ in 0..4 {
            router.route(Reading { ch1: 0.0, ch2: 0.0 }, &mut surface);
        }
        assert_eq!(surface.clears, 0);
        assert_eq!(surface.points.len(), 8);

        router.route(Reading { ch1: 5.0, ch2: 6.0 }, &mut surface);
        assert_eq!(surface.clears, 1);
        assert_eq!(
            surface.points,
            vec![(CH1_LINE, 0.0, 5.0), (CH2_LINE, 0.0, 6.0)]
        );
    }

    #[test]
    fn test_xy_mode() {
        let mut router = TraceRouter::new(&display(PlotMode::Xy));
        let mut surface = Recorder::default();

        router.route(Reading { ch1: 1.5, ch2: -0.5 }, &mut surface);
        assert_eq!(surface.points, vec![(CH1_LINE, 1.5, -0.5)]);
        assert_eq!(router.time(), 0.0);
    }

    #[test]
    fn test_mode_switch_clears_and_resets() {
        let mut router = TraceRouter::new(&display(PlotMode::TimeSeries));
        let mut surface = Recorder::default();
        router.route(Reading { ch1: 1.0, ch2: 1.0 }, &mut surface);

        router.set_mode(PlotMode::Xy, &mut surface);
        assert_eq!(router.mode(), PlotMode::Xy);
        assert_eq!(router.time(), 0.0);
        assert!(surface.points.is_empty());
        assert_eq!(surface.clears, 1);
    }

    #[test]
    fn test_plot_mode_parsing() {
        assert_eq!("time".parse::<PlotMode>().unwrap(), PlotMode::TimeSeries);
        assert_eq!("XY".parse::<PlotMode>().unwrap(), PlotMode::Xy);
        assert!("polar".parse::<PlotMode>().is_err());
        assert_eq!(
            serde_json::to_string(&PlotMode::TimeSeries).unwrap(),
            "\"time\""
        );
    }
}
