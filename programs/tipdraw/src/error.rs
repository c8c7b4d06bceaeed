use anchor_lang::error_code;

#[error_code]
pub enum DrawError {
    Overflow,
    #[msg("A draw with this id already exists")]
    DuplicateDrawId,
    #[msg("No draw exists with this id")]
    DrawNotFound,
    #[msg("This draw is not active")]
    DrawInactive,
    #[msg("This draw has no entries left")]
    DrawFull,
    #[msg("Draw ids must be 1-32 characters of a-z, 0-9, '-' or '_'")]
    InvalidDrawId,
    #[msg("Minimum amount must be positive and not exceed the maximum amount")]
    InvalidAmountRange,
    #[msg("Max entries must be greater than zero")]
    InvalidMaxEntries,
    #[msg("Entry count must be greater than zero")]
    InvalidEntryCount,
    #[msg("Donation amount must be a finite, non-negative number")]
    InvalidAmount,
    #[msg("There are no entries in this draw")]
    NoEntries,
    #[msg("Draw time must be in the future")]
    DrawTimeInPast,
    #[msg("This draw has no scheduled time")]
    DrawNotScheduled,
    #[msg("This currency is not accepted")]
    CurrencyNotAccepted,
    #[msg("This currency is already accepted")]
    CurrencyAlreadyAccepted,
    #[msg("This recipient is already allowed")]
    RecipientAlreadyAllowed,
    #[msg("This recipient is not on the allow-list")]
    RecipientNotAllowed,
    #[msg("Tier bounds are invalid or the tier name is taken")]
    InvalidTier,
    #[msg("No tier exists with this name")]
    TierNotFound,
    #[msg("Only admins may run this command")]
    NotAuthorized,
    #[msg("Unknown command or wrong arguments")]
    InvalidCommand,
    #[msg("No price could be determined for this currency")]
    PriceUnavailable,
    #[msg("The document store could not be initialized")]
    StoreUnavailable,
    #[msg("The guild document could not be saved")]
    PersistenceFailed,
    #[msg("A required setting is missing or malformed")]
    InvalidSettings,
}

/// Short chat-friendly text for an error, without the error-code preamble.
pub fn user_message(error: &anchor_lang::error::Error) -> String {
    match error {
        anchor_lang::error::Error::AnchorError(anchor_error) => anchor_error.error_msg.clone(),
        anchor_lang::error::Error::ProgramError(program_error) => program_error.to_string(),
    }
}
