use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

/// Linear power spectrum oracle.
pub trait LinearPowerSpectrum {
    fn eval(&self, k: f64) -> f64;
}

impl<F: Fn(f64) -> f64> LinearPowerSpectrum for F {
    fn eval(&self, k: f64) -> f64 {
        self(k)
    }
}

/// Analytic spectrum `P(k) = amplitude × k^exponent`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerLawSpectrum {
    amplitude: f64,
    exponent: f64,
}

impl PowerLawSpectrum {
    pub fn new(amplitude: f64, exponent: f64) -> Self {
        Self {
            amplitude,
            exponent,
        }
    }
}

impl LinearPowerSpectrum for PowerLawSpectrum {
    fn eval(&self, k: f64) -> f64 {
        self.amplitude * k.powf(self.exponent)
    }
}

/// Behaviour of a tabulated spectrum for lookups outside its domain.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutOfRange {
    /// Out-of-domain lookups return zero.
    #[default]
    Zero,
    /// Out-of-domain lookups panic. Use this when a silent zero near
    /// the loop-momentum cutoff would bias the integral.
    Panic,
}

#[derive(Debug, Error)]
pub enum PowerSpectrumError {
    #[error("line {line}: expected two columns `k P(k)`, got {got:?}")]
    Malformed { line: usize, got: String },
    #[error("need at least two tabulated points, got {0}")]
    TooFewPoints(usize),
    #[error("point {0}: abscissas must be positive and strictly increasing")]
    NotIncreasing(usize),
    #[error("point {0}: spectrum values must be finite and positive")]
    BadValue(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tabulated linear power spectrum, interpolated linearly in log-log
/// space.
#[derive(Clone, Debug)]
pub struct TabulatedSpectrum {
    lnk: Vec<f64>,
    lnp: Vec<f64>,
    kmin: f64,
    kmax: f64,
    out_of_range: OutOfRange,
}

impl TabulatedSpectrum {
    pub fn from_points(
        points: &[(f64, f64)],
    ) -> Result<Self, PowerSpectrumError> {
        if points.len() < 2 {
            return Err(PowerSpectrumError::TooFewPoints(points.len()));
        }
        let mut lnk = Vec::with_capacity(points.len());
        let mut lnp = Vec::with_capacity(points.len());
        for (n, &(k, p)) in points.iter().enumerate() {
            if !k.is_finite()
                || k <= 0.0
                || lnk.last().is_some_and(|&last| k.ln() <= last)
            {
                return Err(PowerSpectrumError::NotIncreasing(n + 1));
            }
            if !p.is_finite() || p <= 0.0 {
                return Err(PowerSpectrumError::BadValue(n + 1));
            }
            lnk.push(k.ln());
            lnp.push(p.ln());
        }
        Ok(Self {
            lnk,
            lnp,
            kmin: points[0].0,
            kmax: points[points.len() - 1].0,
            out_of_range: OutOfRange::default(),
        })
    }

    /// Reads a two-column `k P(k)` table. Blank lines and `#` comments
    /// are skipped.
    pub fn from_reader(
        reader: impl BufRead,
    ) -> Result<Self, PowerSpectrumError> {
        let mut points = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = || PowerSpectrumError::Malformed {
                line: n + 1,
                got: line.to_owned(),
            };
            let mut cols = line.split_whitespace();
            let (Some(k), Some(p), None) =
                (cols.next(), cols.next(), cols.next())
            else {
                return Err(malformed());
            };
            let (Ok(k), Ok(p)) = (k.parse(), p.parse()) else {
                return Err(malformed());
            };
            points.push((k, p));
        }
        Self::from_points(&points)
    }

    pub fn from_file(
        path: impl AsRef<Path>,
    ) -> Result<Self, PowerSpectrumError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn with_out_of_range(mut self, policy: OutOfRange) -> Self {
        self.out_of_range = policy;
        self
    }

    pub fn kmin(&self) -> f64 {
        self.kmin
    }

    pub fn kmax(&self) -> f64 {
        self.kmax
    }
}

impl LinearPowerSpectrum for TabulatedSpectrum {
    fn eval(&self, k: f64) -> f64 {
        if k < self.kmin || k > self.kmax {
            return match self.out_of_range {
                OutOfRange::Zero => 0.0,
                OutOfRange::Panic => panic!(
                    "power spectrum lookup at k = {k} outside the tabulated domain [{}, {}]",
                    self.kmin, self.kmax
                ),
            };
        }
        let lnk = k.ln();
        let i = match self.lnk.binary_search_by(|x| x.total_cmp(&lnk)) {
            Ok(i) => return self.lnp[i].exp(),
            Err(i) => i,
        };
        let t = (lnk - self.lnk[i - 1]) / (self.lnk[i] - self.lnk[i - 1]);
        (self.lnp[i - 1] + t * (self.lnp[i] - self.lnp[i - 1])).exp()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn power_law() {
        let pl = PowerLawSpectrum::new(2.0, -1.0);
        assert_eq!(pl.eval(4.0), 0.5);
    }

    #[test]
    fn closures_are_spectra() {
        let pl = |k: f64| 1.0 / k;
        assert_eq!(pl.eval(4.0), 0.25);
    }

    #[test]
    fn interpolation_is_exact_on_power_laws() {
        // k^-2 is linear in log-log space, so interpolation is exact
        let points: Vec<_> = (1..=20)
            .map(|n| {
                let k = 0.1 * n as f64;
                (k, k.powi(-2))
            })
            .collect();
        let pl = TabulatedSpectrum::from_points(&points).unwrap();
        assert!((pl.eval(0.1) - 100.0).abs() < 1e-10);
        assert!((pl.eval(0.75) - 0.75f64.powi(-2)).abs() < 1e-10);
        assert!((pl.eval(2.0) - 0.25).abs() < 1e-10);
    }

    #[test]
    fn out_of_range_defaults_to_zero() {
        let pl =
            TabulatedSpectrum::from_points(&[(0.1, 1.0), (1.0, 2.0)]).unwrap();
        assert_eq!(pl.eval(0.01), 0.0);
        assert_eq!(pl.eval(10.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "outside the tabulated domain")]
    fn out_of_range_can_panic() {
        let pl = TabulatedSpectrum::from_points(&[(0.1, 1.0), (1.0, 2.0)])
            .unwrap()
            .with_out_of_range(OutOfRange::Panic);
        pl.eval(10.0);
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(matches!(
            TabulatedSpectrum::from_points(&[(0.1, 1.0)]),
            Err(PowerSpectrumError::TooFewPoints(1))
        ));
        assert!(matches!(
            TabulatedSpectrum::from_points(&[(0.2, 1.0), (0.1, 1.0)]),
            Err(PowerSpectrumError::NotIncreasing(2))
        ));
        assert!(matches!(
            TabulatedSpectrum::from_points(&[(-0.1, 1.0), (0.2, 1.0)]),
            Err(PowerSpectrumError::NotIncreasing(1))
        ));
        assert!(matches!(
            TabulatedSpectrum::from_points(&[(0.1, 1.0), (0.2, -3.0)]),
            Err(PowerSpectrumError::BadValue(2))
        ));
    }

    #[test]
    fn parses_two_column_files() {
        let data = "# CAMB output\n0.1 10.0\n\n0.2 20.0\n0.3 15.0\n";
        let pl = TabulatedSpectrum::from_reader(data.as_bytes()).unwrap();
        assert!((pl.eval(0.2) - 20.0).abs() < 1e-12);
        assert_eq!(pl.kmin(), 0.1);
        assert_eq!(pl.kmax(), 0.3);
    }

    #[test]
    fn rejects_malformed_lines() {
        let data = "0.1 10.0\n0.2 twenty\n";
        match TabulatedSpectrum::from_reader(data.as_bytes()) {
            Err(PowerSpectrumError::Malformed { line, .. }) => {
                assert_eq!(line, 2)
            }
            other => panic!("expected parse failure, got {other:?}"),
        }

        let data = "0.1 10.0 3.0\n";
        assert!(matches!(
            TabulatedSpectrum::from_reader(data.as_bytes()),
            Err(PowerSpectrumError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.1 10.0\n0.2 20.0").unwrap();
        let pl = TabulatedSpectrum::from_file(file.path()).unwrap();
        assert!((pl.eval(0.1) - 10.0).abs() < 1e-12);
    }
}
