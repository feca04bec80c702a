//! Shared state for the command API.

use std::sync::Arc;

use joinwatch_core::commands::CommandHandler;
use joinwatch_core::preferences::{PreferenceCache, PreferenceStore};
use joinwatch_core::presence::PresenceView;

/// State handed to every command API handler.
///
/// Everything here is read-through: presence comes from the published
/// snapshot and preferences from the shared cache, so handlers never block
/// the reconciliation loop.
pub struct AppState<P> {
    commands: CommandHandler<P>,
}

impl<P: PreferenceStore> AppState<P> {
    /// Build state around a presence view.
    pub fn new(presence: PresenceView<P>) -> Self {
        Self::with_commands(CommandHandler::new(presence))
    }

    /// Build state around an already configured command handler.
    pub const fn with_commands(commands: CommandHandler<P>) -> Self {
        Self { commands }
    }

    /// The chat command handler.
    pub const fn commands(&self) -> &CommandHandler<P> {
        &self.commands
    }

    /// The presence view.
    pub const fn presence(&self) -> &PresenceView<P> {
        self.commands.presence()
    }

    /// The shared preference cache.
    pub const fn preferences(&self) -> &Arc<PreferenceCache<P>> {
        self.commands.presence().preferences()
    }
}
