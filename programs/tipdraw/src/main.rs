use tipdraw::{bot, error::user_message, tiers::BoxError, Settings};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let settings = Settings::from_env().map_err(|err| user_message(&err))?;
    bot::start(settings).await
}
