//! Peak splitting: cut a chromatographic peak at an intensity valley deep
//! enough to separate two elution events

use crate::peak::ChromatographicPeak;
use crate::system::Time;

/// Split the peak at a valley when the discrimination factor demands it,
/// keeping the side of the valley holding the identifying MS2 scan. Assumes
/// the envelopes are ordered by scan within each charge state. Repeats until
/// no further cut is triggered.
pub fn cut_peak(
    peak: &mut ChromatographicPeak,
    identification_time: Time,
    discrimination_factor: f64,
    integrate: bool,
) {
    loop {
        let Some(apex) = peak.apex.clone() else { return };

        let time_points: Vec<_> = peak
            .isotopic_envelopes
            .iter()
            .filter(|envelope| envelope.charge_state == apex.charge_state)
            .cloned()
            .collect();

        if time_points.len() < 5 {
            return;
        }

        let Some(apex_index) = time_points.iter().position(|envelope| *envelope == apex) else {
            return;
        };

        let mut cut_valley_rt: Option<Time> = None;

        'directions: for direction in [1_i64, -1] {
            let mut valley: Option<(usize, f64)> = None;
            let last_index = time_points.len() as i64 - 1;

            let mut i = apex_index as i64 + direction;
            while (0..=last_index).contains(&i) {
                let time_point = &time_points[i as usize];

                if valley.map_or(true, |(_, intensity)| time_point.intensity < intensity) {
                    valley = Some((i as usize, time_point.intensity));
                }
                let (valley_index, valley_intensity) = valley.unwrap();

                let factor = (time_point.intensity - valley_intensity) / time_point.intensity;

                let beyond_valley = valley_index as i64 + direction;
                if factor > discrimination_factor && (0..=last_index).contains(&beyond_valley) {
                    let beyond = &time_points[beyond_valley as usize];
                    let second_factor =
                        (beyond.intensity - valley_intensity) / beyond.intensity;
                    if second_factor > discrimination_factor {
                        cut_valley_rt =
                            Some(time_points[valley_index].indexed_peak.retention_time);
                        break 'directions;
                    }
                }

                i += direction;
            }
        }

        let Some(valley_rt) = cut_valley_rt else { return };

        // keep the side of the valley the identification sits on
        if identification_time.value > valley_rt.value {
            peak.isotopic_envelopes
                .retain(|envelope| envelope.indexed_peak.retention_time.value > valley_rt.value);
        } else {
            peak.isotopic_envelopes
                .retain(|envelope| envelope.indexed_peak.retention_time.value < valley_rt.value);
        }

        peak.calculate_intensity(integrate);
        peak.split_rt = Some(valley_rt);
    }
}
