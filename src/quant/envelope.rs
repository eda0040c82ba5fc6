//! Isotopic envelope construction and validation: place the theoretical
//! isotope ladder on every chromatogram peak and accept it only when the
//! observed pattern matches, including a ±1 neutron misassignment check

use crate::chemistry::{to_mass, C13_C12_MASS_DIFFERENCE};
use crate::identification::Identification;
use crate::index::{IndexedPeak, PeakIndex};
use crate::isotopes::IsotopeDistribution;
use crate::peak::IsotopicEnvelope;
use crate::settings::LfqSettings;
use crate::stats::pearson;
use crate::system::da;

/// One found isotope: (observed intensity, theoretical intensity, isotope mass)
type IsotopeLadderPeak = (f64, f64, f64);

/// Build the validated isotopic envelopes for one chromatogram at one charge
/// state. Each chromatogram peak yields at most one envelope; peaks whose
/// observed isotope pattern has too few isotopes, correlates poorly with the
/// theoretical pattern, or is better explained by a ±1 neutron misassignment
/// yield none.
pub fn isotopic_envelopes(
    xic: &[IndexedPeak],
    identification: &Identification,
    charge_state: i32,
    distribution: &IsotopeDistribution,
    index: &PeakIndex,
    settings: &LfqSettings,
) -> Vec<IsotopicEnvelope> {
    let mut envelopes = Vec::new();

    if distribution.len() < settings.num_isotopes_required {
        return envelopes;
    }

    let shifts: Vec<f64> = distribution.iter().map(|(shift, _)| shift.value).collect();
    let abundances: Vec<f64> = distribution.iter().map(|(_, abundance)| *abundance).collect();

    // the index of the most abundant isotope, where chromatogram building started
    let peakfinding_index = (identification.peak_finding_mass.value
        - identification.monoisotopic_mass.value)
        .round() as usize;
    if peakfinding_index >= shifts.len() {
        return envelopes;
    }

    let isotope_tolerance = settings.isotope_tolerance();
    let mut experimental_intensities = vec![0.0; shifts.len()];

    for peak in xic {
        experimental_intensities.fill(0.0);

        // isotope masses are calculated relative to the observed peak
        let observed_mass = to_mass(peak.mz, charge_state);
        let observed_mass_error = observed_mass.value - identification.peak_finding_mass.value;

        // The -1 and +1 ladders model a negative or positive off by one error
        // in peak assignment / deconvolution, the 0 ladder the accurate
        // assignment. The ladder is walked outward from the peak finding
        // index: first every isotope below the most abundant one, then every
        // isotope above it, stopping at the first expected isotope that can
        // not be found.
        let mut ladders: [Vec<IsotopeLadderPeak>; 3] = [Vec::new(), Vec::new(), Vec::new()];

        for (ladder, offset) in ladders.iter_mut().zip([-1_i32, 0, 1]) {
            for direction in [-1_i64, 1] {
                let mut i = if direction == -1 {
                    peakfinding_index as i64 - 1
                } else {
                    peakfinding_index as i64
                };

                while i >= 0 && (i as usize) < shifts.len() {
                    let isotope_mass = identification.monoisotopic_mass.value
                        + observed_mass_error
                        + shifts[i as usize]
                        + f64::from(offset) * C13_C12_MASS_DIFFERENCE;
                    let theoretical_intensity = abundances[i as usize] * peak.intensity;

                    let found = index.find(
                        da(isotope_mass),
                        peak.scan_index,
                        isotope_tolerance,
                        charge_state,
                    );
                    let Some(isotope_peak) = found else { break };
                    if isotope_peak.intensity < theoretical_intensity / 4.0
                        || isotope_peak.intensity > theoretical_intensity * 4.0
                    {
                        break;
                    }

                    ladder.push((isotope_peak.intensity, theoretical_intensity, isotope_mass));
                    if offset == 0 {
                        experimental_intensities[i as usize] = isotope_peak.intensity;
                    }

                    i += direction;
                }
            }
        }

        if ladders[1].len() < settings.num_isotopes_required {
            continue;
        }

        if !envelope_correlates(&mut ladders, peak, charge_state, index, settings) {
            continue;
        }

        // isotopes expected but not found are filled in from the theoretical pattern
        let anchor_intensity = experimental_intensities[peakfinding_index];
        for (intensity, abundance) in experimental_intensities.iter_mut().zip(&abundances) {
            if *intensity == 0.0 {
                *intensity = abundance * anchor_intensity;
            }
        }
        let summed_intensity: f64 = experimental_intensities.iter().sum();

        envelopes.push(IsotopicEnvelope::new(*peak, charge_state, summed_intensity));
    }

    envelopes
}

/// Check the observed against the theoretical isotope pattern. The plain
/// correlation of the unshifted ladder must exceed 0.7. On top of that every
/// ladder is padded with the peak one neutron below its lightest isotope
/// (theoretical intensity zero, observed whatever the index holds there): an
/// envelope whose padded ±1 ladder correlates markedly better than the padded
/// unshifted ladder is a misassignment by one neutron and is rejected.
fn envelope_correlates(
    ladders: &mut [Vec<IsotopeLadderPeak>; 3],
    peak: &IndexedPeak,
    charge_state: i32,
    index: &PeakIndex,
    settings: &LfqSettings,
) -> bool {
    let correlation = ladder_correlation(&ladders[1]);

    let isotope_tolerance = settings.isotope_tolerance();
    for ladder in ladders.iter_mut() {
        if ladder.is_empty() {
            continue;
        }
        let lightest_mass = ladder
            .iter()
            .map(|(_, _, mass)| *mass)
            .fold(f64::MAX, f64::min);
        let unexpected_mass = lightest_mass - C13_C12_MASS_DIFFERENCE;
        let unexpected_intensity = index
            .find(
                da(unexpected_mass),
                peak.scan_index,
                isotope_tolerance,
                charge_state,
            )
            .map_or(0.0, |unexpected| unexpected.intensity);
        ladder.push((unexpected_intensity, 0.0, unexpected_mass));
    }

    let correlation_with_padding = ladder_correlation(&ladders[1]);
    let mut correlation_shifted_left = ladder_correlation(&ladders[0]);
    let mut correlation_shifted_right = ladder_correlation(&ladders[2]);
    if correlation_shifted_left.is_nan() {
        correlation_shifted_left = -1.0;
    }
    if correlation_shifted_right.is_nan() {
        correlation_shifted_right = -1.0;
    }

    correlation > 0.7
        && correlation_shifted_left - correlation_with_padding < 0.1
        && correlation_shifted_right - correlation_with_padding < 0.1
}

fn ladder_correlation(ladder: &[IsotopeLadderPeak]) -> f64 {
    let experimental: Vec<f64> = ladder.iter().map(|(observed, _, _)| *observed).collect();
    let theoretical: Vec<f64> = ladder.iter().map(|(_, theoretical, _)| *theoretical).collect();
    pearson(&experimental, &theoretical)
}
