//! Interactive wizard for building a migration configuration.
//!
//! The wizard asks for both endpoints and an optional admin user, shows a
//! preview, and hands back the confirmed configuration. Running it is left
//! to the caller so every entry point shares one run path.

mod prompts;
mod ui;

pub use prompts::WizardPrompts;
pub use ui::{redact_uri, WizardUI};

use crate::config::{EndpointConfig, MigrationConfig, MigrationOptions, UserRequest};
use crate::error::Result;

/// Answers collected during wizard interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardAnswers {
    /// Source connection string.
    pub source_uri: String,
    /// Source database name.
    pub source_database: String,
    /// Destination connection string.
    pub destination_uri: String,
    /// Destination database name.
    pub destination_database: String,
    /// User to provision, if one was requested.
    pub user: Option<UserRequest>,
}

impl WizardAnswers {
    /// Builds a full configuration around these answers.
    #[must_use]
    pub fn into_config(self, options: MigrationOptions) -> MigrationConfig {
        MigrationConfig {
            source: EndpointConfig {
                uri: self.source_uri.trim().to_string(),
                database: self.source_database.trim().to_string(),
            },
            destination: EndpointConfig {
                uri: self.destination_uri.trim().to_string(),
                database: self.destination_database.trim().to_string(),
            },
            user: self.user,
            options,
        }
    }
}

/// Interactive migration wizard.
pub struct Wizard {
    ui: WizardUI,
    prompts: WizardPrompts,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    /// Creates a new wizard instance.
    pub fn new() -> Self {
        Self {
            ui: WizardUI::new(),
            prompts: WizardPrompts::new(),
        }
    }

    /// Runs the prompts and returns the confirmed configuration.
    ///
    /// Returns `Ok(None)` if the user declines the preview.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if a prompt is interrupted or the
    /// answers do not validate.
    pub fn run(&self, options: MigrationOptions) -> Result<Option<MigrationConfig>> {
        self.ui.print_header();

        let answers = self.prompts.collect_answers()?;
        let config = answers.into_config(options);
        config.validate()?;

        if !self.prompts.confirm_migration(&config)? {
            self.ui.print_cancelled();
            return Ok(None);
        }

        self.ui.print_starting_migration();
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Region;

    fn answers() -> WizardAnswers {
        WizardAnswers {
            source_uri: " mongodb://prod:27017 ".to_string(),
            source_database: "app ".to_string(),
            destination_uri: "mongodb://backup:27017".to_string(),
            destination_database: "app_copy".to_string(),
            user: None,
        }
    }

    #[test]
    fn test_answers_into_config_trims_fields() {
        let config = answers().into_config(MigrationOptions::default());

        assert_eq!(config.source.uri, "mongodb://prod:27017");
        assert_eq!(config.source.database, "app");
        assert_eq!(config.destination.database, "app_copy");
        assert!(config.user.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_answers_into_config_keeps_options_and_user() {
        let mut input = answers();
        input.user = Some(UserRequest {
            email: "ops@example.com".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            region: Region::West,
        });
        let options = MigrationOptions {
            page_size: 50,
            ..MigrationOptions::default()
        };

        let config = input.into_config(options);

        assert_eq!(config.options.page_size, 50);
        assert_eq!(config.user.unwrap().region, Region::West);
    }

    #[test]
    fn test_wizard_new() {
        let _wizard = Wizard::new();
        let _default = Wizard::default();
    }
}
