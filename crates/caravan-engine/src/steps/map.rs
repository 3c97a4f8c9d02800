//! Map step: a coordinate pin with a message.

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use crate::ui::StepUi;

use super::{require_f64, require_str};

#[derive(Debug, Clone)]
pub struct MapStep {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom_level: f64,
    pub message_html: String,
}

impl MapStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if any of `lat`, `lng`, `zoom`, or
    /// `message` is missing, or the coordinates are out of range.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let latitude = require_f64(config, "lat", "a map step must have a numeric 'lat' parameter")?;
        let longitude =
            require_f64(config, "lng", "a map step must have a numeric 'lng' parameter")?;
        let zoom_level =
            require_f64(config, "zoom", "a map step must have a numeric 'zoom' parameter")?;
        let message_html =
            require_str(config, "message", "a map step must have a 'message' parameter")?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(EngineError::script(
                "a map step's coordinates are out of range",
            ));
        }
        Ok(Self {
            latitude,
            longitude,
            zoom_level,
            message_html,
        })
    }

    pub(super) fn ui_state(&self, id: StepId) -> StepUi {
        StepUi::Map {
            step_id: id,
            latitude: self.latitude,
            longitude: self.longitude,
            zoom_level: self.zoom_level,
            message_html: self.message_html.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_project() {
        let step = MapStep::parse(
            &serde_yaml::from_str("lat: 49.28\nlng: -123.12\nzoom: 14\nmessage: Meet here\n")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            step.ui_state(50),
            StepUi::Map {
                step_id: 50,
                latitude: 49.28,
                longitude: -123.12,
                zoom_level: 14.0,
                message_html: "Meet here".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_coordinates() {
        assert!(
            MapStep::parse(
                &serde_yaml::from_str("lat: 95\nlng: 0\nzoom: 10\nmessage: x\n").unwrap()
            )
            .is_err()
        );
    }
}
