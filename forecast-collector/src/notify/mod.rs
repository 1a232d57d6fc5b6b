pub mod teams_webhook;

pub use teams_webhook::TeamsWebhookNotifier;
