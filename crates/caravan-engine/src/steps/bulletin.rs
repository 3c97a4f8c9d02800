//! Bulletin step: a fixed HTML notice.

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use crate::ui::StepUi;

use super::require_str;

#[derive(Debug, Clone)]
pub struct BulletinStep {
    pub html: String,
}

impl BulletinStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `html` is missing.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        Ok(Self {
            html: require_str(
                config,
                "html",
                "a bulletin step must have an 'html' parameter with the bulletin content",
            )?,
        })
    }

    pub(super) fn ui_state(&self, id: StepId) -> StepUi {
        StepUi::Bulletin {
            step_id: id,
            bulletin_html: self.html.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_the_html() {
        let step =
            BulletinStep::parse(&serde_yaml::from_str("html: <p>Storm incoming.</p>\n").unwrap())
                .unwrap();
        assert_eq!(
            step.ui_state(30),
            StepUi::Bulletin {
                step_id: 30,
                bulletin_html: "<p>Storm incoming.</p>".to_owned(),
            }
        );
    }
}
