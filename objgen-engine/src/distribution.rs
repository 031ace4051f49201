//! Numeric distributions used to sample object sizes.
//!
//! Every [`Distribution`] is validated at construction so that its support never reaches below
//! zero: sizes and counts sampled from it are never negative.

use std::fmt;

use rand::Rng;
use rand::distr::Uniform;
use rand_distr::Distribution as _;
use rand_distr::{LogNormal, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spreads below this value degenerate to a constant distribution.
const SPREAD_EPSILON: f64 = 1e-6;

/// Normal samples are redrawn this many times before clamping to the truncated support.
const MAX_REDRAWS: usize = 16;

/// The shape of a [`Distribution`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Always yields the average.
    Constant,
    /// Uniform over `[average - spread, average + spread]`.
    Uniform,
    /// Normal with the given average and standard deviation, truncated at three deviations.
    Normal,
    /// Log-normal with the given average and standard deviation.
    LogNormal,
    /// Poisson with the given average; the spread is ignored.
    Poisson,
}

#[derive(Clone, Debug)]
enum Sampler {
    Constant,
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Poisson(Poisson<f64>),
}

/// A validated numeric distribution.
#[derive(Clone, Debug)]
pub struct Distribution {
    average: f64,
    spread: f64,
    sampler: Sampler,
}

impl Distribution {
    /// Creates a distribution of the given shape.
    pub fn new(shape: Shape, average: f64, spread: f64) -> Result<Self> {
        match shape {
            Shape::Constant => Self::constant(average),
            Shape::Uniform => Self::uniform(average, spread),
            Shape::Normal => Self::normal(average, spread),
            Shape::LogNormal => Self::lognormal(average, spread),
            Shape::Poisson => Self::poisson(average),
        }
    }

    /// A distribution that always yields `average`.
    pub fn constant(average: f64) -> Result<Self> {
        check_average(average)?;
        Ok(Self {
            average,
            spread: 0.0,
            sampler: Sampler::Constant,
        })
    }

    /// A uniform distribution over `[average - spread, average + spread]`.
    pub fn uniform(average: f64, spread: f64) -> Result<Self> {
        check_average(average)?;
        check_spread(spread)?;
        if spread < SPREAD_EPSILON {
            return Self::constant(average);
        }

        let lower = average - spread;
        check_lower_bound(lower, "average - spread")?;
        let uniform = Uniform::new_inclusive(lower, average + spread)
            .map_err(|err| Error::invalid(format!("uniform distribution: {err}")))?;

        Ok(Self {
            average,
            spread,
            sampler: Sampler::Uniform(uniform),
        })
    }

    /// A normal distribution with standard deviation `spread`.
    ///
    /// `average - 3 * spread` must not be negative. Samples are truncated to three standard
    /// deviations around the average.
    pub fn normal(average: f64, spread: f64) -> Result<Self> {
        check_average(average)?;
        check_spread(spread)?;
        if spread < SPREAD_EPSILON {
            return Self::constant(average);
        }

        check_lower_bound(average - 3.0 * spread, "average - 3 * spread")?;
        let normal = Normal::new(average, spread)
            .map_err(|err| Error::invalid(format!("normal distribution: {err}")))?;

        Ok(Self {
            average,
            spread,
            sampler: Sampler::Normal(normal),
        })
    }

    /// A log-normal distribution whose mean is `average` and standard deviation is `spread`.
    ///
    /// Like [`normal`](Self::normal), `average - 3 * spread` must not be negative.
    pub fn lognormal(average: f64, spread: f64) -> Result<Self> {
        check_average(average)?;
        check_spread(spread)?;
        if spread < SPREAD_EPSILON {
            return Self::constant(average);
        }

        check_lower_bound(average - 3.0 * spread, "average - 3 * spread")?;
        // Match the first two moments of the underlying normal distribution.
        let sigma_squared = (1.0 + (spread * spread) / (average * average)).ln();
        let mu = average.ln() - sigma_squared / 2.0;
        let lognormal = LogNormal::new(mu, sigma_squared.sqrt())
            .map_err(|err| Error::invalid(format!("lognormal distribution: {err}")))?;

        Ok(Self {
            average,
            spread,
            sampler: Sampler::LogNormal(lognormal),
        })
    }

    /// A Poisson distribution with mean `average`.
    pub fn poisson(average: f64) -> Result<Self> {
        check_average(average)?;
        if average == 0.0 {
            return Self::constant(average);
        }

        let poisson = Poisson::new(average)
            .map_err(|err| Error::invalid(format!("poisson distribution: {err}")))?;

        Ok(Self {
            average,
            spread: 0.0,
            sampler: Sampler::Poisson(poisson),
        })
    }

    /// Draws a sample, advancing `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.sampler {
            Sampler::Constant => self.average,
            Sampler::Uniform(uniform) => uniform.sample(rng),
            Sampler::Normal(normal) => {
                let lower = self.average - 3.0 * self.spread;
                let upper = self.average + 3.0 * self.spread;
                for _ in 0..MAX_REDRAWS {
                    let value = normal.sample(rng);
                    if (lower..=upper).contains(&value) {
                        return value;
                    }
                }
                normal.sample(rng).clamp(lower, upper)
            }
            Sampler::LogNormal(lognormal) => lognormal.sample(rng),
            Sampler::Poisson(poisson) => poisson.sample(rng),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.sampler {
            Sampler::Constant => "constant",
            Sampler::Uniform(_) => "uniform",
            Sampler::Normal(_) => "normal",
            Sampler::LogNormal(_) => "lognormal",
            Sampler::Poisson(_) => "poisson",
        };
        write!(f, "{name} [average={}, spread={}]", self.average, self.spread)
    }
}

fn check_average(average: f64) -> Result<()> {
    if !(average >= 0.0 && average.is_finite()) {
        return Err(Error::invalid(format!("average must be >= 0.0 [{average}]")));
    }
    Ok(())
}

fn check_spread(spread: f64) -> Result<()> {
    if !(spread >= 0.0 && spread.is_finite()) {
        return Err(Error::invalid(format!("spread must be >= 0.0 [{spread}]")));
    }
    Ok(())
}

fn check_lower_bound(lower: f64, what: &str) -> Result<()> {
    if lower < 0.0 {
        return Err(Error::invalid(format!("{what} must be >= 0.0 [{lower}]")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    const DRAWS: usize = 10_000;

    fn assert_non_negative(distribution: &Distribution) {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..DRAWS {
            let value = distribution.sample(&mut rng);
            assert!(value >= 0.0, "{distribution} produced {value}");
        }
    }

    #[test]
    fn never_negative_at_lower_bound() {
        assert_non_negative(&Distribution::uniform(100.0, 100.0).unwrap());
        assert_non_negative(&Distribution::normal(300.0, 100.0).unwrap());
        assert_non_negative(&Distribution::lognormal(300.0, 100.0).unwrap());
        assert_non_negative(&Distribution::poisson(3.0).unwrap());
        assert_non_negative(&Distribution::constant(0.0).unwrap());
    }

    #[test]
    fn rejects_negative_parameters() {
        for shape in [Shape::Constant, Shape::Uniform, Shape::Normal, Shape::LogNormal] {
            assert!(Distribution::new(shape, -1.0, 0.0).is_err(), "{shape:?}");
        }
        assert!(Distribution::uniform(10.0, -1.0).is_err());
        assert!(Distribution::poisson(-0.5).is_err());
        assert!(Distribution::constant(f64::NAN).is_err());
    }

    #[test]
    fn rejects_negative_support() {
        assert!(Distribution::uniform(10.0, 10.5).is_err());
        assert!(Distribution::normal(10.0, 4.0).is_err());
        assert!(Distribution::lognormal(10.0, 4.0).is_err());
        assert!(Distribution::normal(12.0, 4.0).is_ok());
    }

    #[test]
    fn zero_spread_is_constant() {
        let mut rng = SmallRng::seed_from_u64(0);
        for shape in [Shape::Uniform, Shape::Normal, Shape::LogNormal] {
            let distribution = Distribution::new(shape, 42.0, 0.0).unwrap();
            assert_eq!(distribution.to_string(), "constant [average=42, spread=0]");
            assert_eq!(distribution.sample(&mut rng), 42.0);
        }
    }

    #[test]
    fn uniform_stays_in_range() {
        let distribution = Distribution::uniform(100.0, 20.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..DRAWS {
            let value = distribution.sample(&mut rng);
            assert!((80.0..=120.0).contains(&value));
        }
    }

    #[test]
    fn lognormal_matches_average() {
        let distribution = Distribution::lognormal(1000.0, 200.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let mean = (0..DRAWS)
            .map(|_| distribution.sample(&mut rng))
            .sum::<f64>()
            / DRAWS as f64;

        assert!((mean - 1000.0).abs() < 20.0, "mean was {mean}");
    }

    #[test]
    fn deterministic_given_seed() {
        let distribution = Distribution::normal(500.0, 50.0).unwrap();
        let mut a = SmallRng::seed_from_u64(99);
        let mut b = SmallRng::seed_from_u64(99);
        for _ in 0..100 {
            assert_eq!(distribution.sample(&mut a), distribution.sample(&mut b));
        }
    }
}
