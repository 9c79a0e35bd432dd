//! Hysteresis peak detection ("peakdet").
//!
//! A point is a peak when it is the running maximum and the series later
//! drops more than `delta` below it; a trough is the mirror image. The
//! detector alternates between looking for a maximum and looking for a
//! minimum, so small wiggles under `delta` never produce extra extrema.
//!
//! One addition to the classic algorithm: when the series ends while
//! looking for a maximum and that maximum sits more than `delta` above the
//! last minimum, it is reported too. The end of the window is treated as the
//! drop, so a burst still in progress at the window's end is not lost.

use serde::Serialize;

/// A confirmed extremum: bucket index and value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extremum {
    pub position: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extrema {
    pub maxima: Vec<Extremum>,
    pub minima: Vec<Extremum>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seeking {
    Max,
    Min,
}

/// Run peakdet over `v` with absolute threshold `delta`.
pub fn peakdet(v: &[f64], delta: f64) -> Extrema {
    let mut out = Extrema::default();

    let (mut mn, mut mx) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut mn_pos, mut mx_pos) = (0usize, 0usize);
    let mut state = Seeking::Max;

    for (i, &this) in v.iter().enumerate() {
        if this > mx {
            mx = this;
            mx_pos = i;
        }
        if this < mn {
            mn = this;
            mn_pos = i;
        }

        match state {
            Seeking::Max if this < mx - delta => {
                out.maxima.push(Extremum {
                    position: mx_pos,
                    value: mx,
                });
                mn = this;
                mn_pos = i;
                state = Seeking::Min;
            }
            Seeking::Min if this > mn + delta => {
                out.minima.push(Extremum {
                    position: mn_pos,
                    value: mn,
                });
                mx = this;
                mx_pos = i;
                state = Seeking::Max;
            }
            _ => {}
        }
    }

    if state == Seeking::Max && !v.is_empty() && mx > mn + delta && mx_pos > mn_pos {
        out.maxima.push(Extremum {
            position: mx_pos,
            value: mx,
        });
    }

    out
}

/// `max(counts) * ratio`.
pub fn threshold(counts: &[u32], ratio: f64) -> f64 {
    counts.iter().copied().max().unwrap_or(0) as f64 * ratio
}

/// Peaks of a bucket count series, ascending by position.
///
/// Empty, single-bucket and all-zero series have no peaks.
pub fn detect_peaks(counts: &[u32], delta: f64) -> Vec<Extremum> {
    if counts.len() < 2 || counts.iter().all(|&c| c == 0) {
        return Vec::new();
    }
    let v: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    peakdet(&v, delta).maxima
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(peaks: &[Extremum]) -> Vec<(usize, f64)> {
        peaks.iter().map(|p| (p.position, p.value)).collect()
    }

    #[test]
    fn test_two_spikes() {
        let peaks = detect_peaks(&[0, 0, 5, 0, 0, 8, 1, 0], 2.0);
        assert_eq!(positions(&peaks), vec![(2, 5.0), (5, 8.0)]);
    }

    #[test]
    fn test_troughs_are_tracked() {
        let v = [0.0, 0.0, 5.0, 0.0, 0.0, 8.0, 1.0, 0.0];
        let extrema = peakdet(&v, 2.0);
        assert_eq!(
            extrema.minima,
            vec![Extremum {
                position: 3,
                value: 0.0
            }]
        );
    }

    #[test]
    fn test_burst_at_window_end() {
        let peaks = detect_peaks(&[2, 1, 0, 0, 2], 0.5);
        assert_eq!(positions(&peaks), vec![(0, 2.0), (4, 2.0)]);
    }

    #[test]
    fn test_rising_series_reports_final_max() {
        let peaks = detect_peaks(&[0, 1, 2, 3], threshold(&[0, 1, 2, 3], 0.25));
        assert_eq!(positions(&peaks), vec![(3, 3.0)]);
    }

    #[test]
    fn test_flat_series_has_no_peaks() {
        assert!(detect_peaks(&[0, 0, 0, 0], 0.0).is_empty());
        assert!(detect_peaks(&[3, 3, 3], threshold(&[3, 3, 3], 0.25)).is_empty());
    }

    #[test]
    fn test_degenerate_lengths() {
        assert!(detect_peaks(&[], 1.0).is_empty());
        assert!(detect_peaks(&[9], 1.0).is_empty());
    }

    #[test]
    fn test_small_wiggles_ignored() {
        // delta 2.5: the 4 -> 3 -> 4 wiggle is not a separate peak
        let counts = [0, 4, 3, 4, 10, 1, 0];
        let peaks = detect_peaks(&counts, threshold(&counts, 0.25));
        assert_eq!(positions(&peaks), vec![(4, 10.0)]);
    }

    #[test]
    fn test_threshold() {
        assert_eq!(threshold(&[0, 4, 8], 0.25), 2.0);
        assert_eq!(threshold(&[], 0.25), 0.0);
    }
}
