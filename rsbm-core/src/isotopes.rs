//! Isotope mass balance.
//!
//! Ratios are carried in delta notation (per mil) relative to the species
//! standard. A reservoir with no mass has no defined ratio; this is represented
//! as `None` throughout the crate.
//!
//! The mixing rule is linear in delta, which is exact for mass-weighted deltas
//! and the convention used by box models of this kind:
//!
//! $$ \delta_{mix} = \frac{M \delta + \sum_i m_i \delta_i}{M + \sum_i m_i} $$

use crate::errors::{RSBMError, RSBMResult};
use crate::species::IsotopeStandard;

/// Delta value (per mil) of a sample with heavy/light mass ratio `ratio`.
pub fn delta_from_ratio(ratio: f64, standard: &IsotopeStandard) -> f64 {
    1000.0 * (ratio - standard.ratio) / standard.ratio
}

/// Heavy/light ratio corresponding to `delta`.
pub fn ratio_from_delta(delta: f64, standard: &IsotopeStandard) -> f64 {
    (delta / 1000.0 + 1.0) * standard.ratio
}

/// Delta value of a sample given its heavy and light isotope masses.
pub fn delta_from_masses(heavy: f64, light: f64, standard: &IsotopeStandard) -> RSBMResult<f64> {
    if light <= 0.0 {
        return Err(RSBMError::UndefinedRatio {
            context: "light isotope mass".to_string(),
        });
    }
    Ok(delta_from_ratio(heavy / light, standard))
}

/// Mass of the light isotope in a total mass `mass` with composition `delta`.
pub fn light_isotope_mass(mass: f64, delta: f64, standard: &IsotopeStandard) -> f64 {
    1000.0 * mass / ((delta + 1000.0) * standard.ratio + 1000.0)
}

/// Splits a total mass into its (light, heavy) isotope masses.
pub fn isotope_masses(mass: f64, delta: f64, standard: &IsotopeStandard) -> (f64, f64) {
    let light = light_isotope_mass(mass, delta, standard);
    (light, mass - light)
}

/// Mixes transfers into a reservoir and returns the resulting delta.
///
/// `transfers` are `(mass, delta)` pairs; negative masses remove material at
/// the given composition. A transfer with an undefined ratio carries the
/// composition of the receiving reservoir and so does not change it.
/// An undefined `delta` on the reservoir itself contributes no isotope mass.
///
/// Fails with [`RSBMError::UndefinedRatio`] when the total mass with a defined
/// composition is zero.
pub fn mix<I>(mass: f64, delta: Option<f64>, transfers: I) -> RSBMResult<f64>
where
    I: IntoIterator<Item = (f64, Option<f64>)>,
{
    let mut weighted = 0.0;
    let mut total = 0.0;
    if let Some(d) = delta {
        weighted += mass * d;
        total += mass;
    }
    // A transfer where neither side has a composition adds nothing to mix
    for (m, d) in transfers {
        if let Some(d) = d.or(delta) {
            weighted += m * d;
            total += m;
        }
    }
    if total == 0.0 {
        return Err(RSBMError::UndefinedRatio {
            context: "mixture".to_string(),
        });
    }
    Ok(weighted / total)
}

/// Composition of a flux after kinetic fractionation by `alpha` (per mil).
///
/// $$ \delta_f = \frac{1000 + \delta_{src}}{1 + \alpha / 1000} - 1000 $$
pub fn fractionate(delta: f64, alpha: f64) -> f64 {
    (1000.0 + delta) / (1.0 + alpha / 1000.0) - 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vpdb() -> IsotopeStandard {
        IsotopeStandard::new(0.0112372, "VPDB")
    }

    #[test]
    fn delta_ratio_round_trip() {
        let standard = vpdb();
        for delta in [-30.0, 0.0, 2.5, 40.0] {
            let ratio = ratio_from_delta(delta, &standard);
            assert_relative_eq!(delta_from_ratio(ratio, &standard), delta, epsilon = 1e-10);
        }
        assert_relative_eq!(delta_from_ratio(standard.ratio, &standard), 0.0);
    }

    #[test]
    fn light_and_heavy_masses() {
        let standard = vpdb();
        let (light, heavy) = isotope_masses(100.0, 0.0, &standard);
        assert_relative_eq!(light + heavy, 100.0);
        assert_relative_eq!(heavy / light, standard.ratio, max_relative = 1e-12);

        let (light, heavy) = isotope_masses(100.0, -25.0, &standard);
        assert_relative_eq!(
            delta_from_masses(heavy, light, &standard).unwrap(),
            -25.0,
            epsilon = 1e-9
        );
        assert!(delta_from_masses(1.0, 0.0, &standard).is_err());
    }

    #[test]
    fn mixing_equal_compositions_is_idempotent() {
        let mixed = mix(100.0, Some(-5.0), [(10.0, Some(-5.0)), (3.0, Some(-5.0))]).unwrap();
        assert_relative_eq!(mixed, -5.0);

        let removed = mix(100.0, Some(-5.0), [(-40.0, Some(-5.0))]).unwrap();
        assert_relative_eq!(removed, -5.0);
    }

    #[test]
    fn mixing_weights_by_mass() {
        let mixed = mix(100.0, Some(0.0), [(100.0, Some(-10.0))]).unwrap();
        assert_relative_eq!(mixed, -5.0);
    }

    #[test]
    fn mixing_into_empty_reservoir() {
        assert_relative_eq!(mix(0.0, None, [(5.0, Some(3.0))]).unwrap(), 3.0);
        assert!(matches!(
            mix(0.0, None, [(5.0, None)]),
            Err(RSBMError::UndefinedRatio { .. })
        ));
        assert!(mix(0.0, Some(1.0), []).is_err());
    }

    #[test]
    fn undefined_transfer_inherits_reservoir() {
        let mixed = mix(50.0, Some(2.0), [(10.0, None), (10.0, Some(2.0))]).unwrap();
        assert_relative_eq!(mixed, 2.0);
    }

    #[test]
    fn fractionation() {
        assert_relative_eq!(fractionate(0.0, 0.0), 0.0);
        // alpha of 1000 per mil halves (1000 + delta)
        assert_relative_eq!(fractionate(0.0, 1000.0), -500.0);
        assert!(fractionate(0.0, 25.0) < 0.0);
        assert!(fractionate(0.0, -25.0) > 0.0);
    }
}
