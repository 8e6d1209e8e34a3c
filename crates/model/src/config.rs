use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tunables controlling minimum dwell times and default wait behaviour.
/// Minutes throughout. There is no file format for this type (construction
/// is the embedding application's concern); `Default` matches the values
/// the original dispatcher tool shipped with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchParams {
    pub mindestaufenthalt_planhalt: f64,
    pub mindestaufenthalt_lokwechsel: f64,
    pub mindestaufenthalt_lokumlauf: f64,
    pub mindestaufenthalt_richtungswechsel: f64,
    pub mindestaufenthalt_ersatz: f64,
    pub mindestaufenthalt_kupplung: f64,
    pub mindestaufenthalt_fluegelung: f64,
    pub wartezeit_ankunft_abwarten: f64,
    pub wartezeit_abfahrt_abwarten: f64,
    pub update_interval_secs: u64,
}

impl Default for DispatchParams {
    fn default() -> Self {
        Self {
            mindestaufenthalt_planhalt: 0.0,
            mindestaufenthalt_lokwechsel: 5.0,
            mindestaufenthalt_lokumlauf: 2.0,
            mindestaufenthalt_richtungswechsel: 2.0,
            mindestaufenthalt_ersatz: 1.0,
            mindestaufenthalt_kupplung: 1.0,
            mindestaufenthalt_fluegelung: 1.0,
            wartezeit_ankunft_abwarten: 0.0,
            wartezeit_abfahrt_abwarten: 2.0,
            update_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = DispatchParams::default();
        assert_eq!(params.mindestaufenthalt_lokwechsel, 5.0);
        assert_eq!(params.wartezeit_abfahrt_abwarten, 2.0);
        assert_eq!(params.update_interval_secs, 30);
    }
}
