//! Announcement text rendering via `minijinja`.
//!
//! The template is configurable (`chat.announce_template`) and receives two
//! variables: `name`, the identity that joined, and `observed_at`, an
//! RFC 3339 timestamp.

use joinwatch_core::sink::NotifyError;
use joinwatch_types::JoinEvent;
use minijinja::{Environment, context};

use crate::error::BotError;

const TEMPLATE_NAME: &str = "join";

/// Renders join events into chat messages.
pub struct Announcer {
    env: Environment<'static>,
}

impl Announcer {
    /// Compile `template`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Template`] if the template has a syntax error.
    pub fn new(template: &str) -> Result<Self, BotError> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, template.to_owned())
            .map_err(|e| BotError::Template(format!("invalid announce template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the announcement for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Render`] if rendering fails.
    pub fn render(&self, event: &JoinEvent) -> Result<String, NotifyError> {
        self.env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| NotifyError::Render(e.to_string()))?
            .render(context! {
                name => event.identity.as_str(),
                observed_at => event.observed_at.to_rfc3339(),
            })
            .map_err(|e| NotifyError::Render(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use joinwatch_core::config::ChatConfig;
    use joinwatch_types::Identity;

    use super::*;

    #[test]
    fn default_template_matches_classic_wording() {
        let announcer = Announcer::new(&ChatConfig::default().announce_template).unwrap();
        let text = announcer
            .render(&JoinEvent::now(Identity::from("Steve")))
            .unwrap();
        assert_eq!(text, "🎮 **Steve** just joined the minecraft server!");
    }

    #[test]
    fn custom_template_sees_timestamp() {
        let announcer = Announcer::new("{{ name }} @ {{ observed_at[:4] }}").unwrap();
        let event = JoinEvent::now(Identity::from("Alex"));
        let year = event.observed_at.format("%Y").to_string();
        assert_eq!(announcer.render(&event).unwrap(), format!("Alex @ {year}"));
    }

    #[test]
    fn broken_template_is_rejected() {
        assert!(matches!(
            Announcer::new("{{ name "),
            Err(BotError::Template(_))
        ));
    }
}
