//! Parsers for the two chat messages that make up a donation: the donor's
//! own `tip` command and the tipping bot's confirmation of the transfer.

use crate::constants::SATOSHI_PER_BTC;
use crate::state::{normalize_draw_id, DrawId, Recipient};

/// A donor's stated intent, `tip <@recipient> <amount> [#drawTag]`. The
/// recipient may be a user or a role mention.
#[derive(Clone, Debug, PartialEq)]
pub struct TipIntent {
    pub recipient: Recipient,
    pub amount_text: String,
    pub target_draw_id: Option<DrawId>,
}

/// A transfer reported by the tipping bot.
#[derive(Clone, Debug, PartialEq)]
pub struct TipConfirmation {
    pub sender_id: u64,
    pub recipient_ids: Vec<u64>,
    pub role_ids: Vec<u64>,
    pub amount: f64,
    pub symbol: String,
    pub usd_estimate: Option<f64>,
}

impl TipConfirmation {
    /// Every mentioned recipient, users before roles.
    pub fn recipients(&self) -> Vec<Recipient> {
        self.recipient_ids
            .iter()
            .copied()
            .map(Recipient::User)
            .chain(self.role_ids.iter().copied().map(Recipient::Role))
            .collect()
    }
}

#[derive(Default)]
struct Mentions {
    users: Vec<u64>,
    roles: Vec<u64>,
}

/// Parses `<@id>`, `<@!id>` and `<@&id>` mentions in order of appearance.
fn scan_mentions(text: &str) -> Mentions {
    let mut mentions = Mentions::default();
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find('>') else {
            break;
        };
        let body = &rest[..end];
        if let Some(id) = body.strip_prefix('&').and_then(|id| id.parse().ok()) {
            mentions.roles.push(id);
        } else if let Ok(id) = body.trim_start_matches('!').parse() {
            mentions.users.push(id);
        }
        rest = &rest[end + 1..];
    }
    mentions
}

fn parse_mention(token: &str) -> Option<Recipient> {
    let body = token.strip_prefix("<@")?.strip_suffix('>')?;
    match body.strip_prefix('&') {
        Some(role) => role.parse().ok().map(Recipient::Role),
        None => body.trim_start_matches('!').parse().ok().map(Recipient::User),
    }
}

/// Parses a user's tip command. Anything off-grammar yields `None`.
pub fn parse_tip_intent(text: &str) -> Option<TipIntent> {
    let mut tokens = text.split_whitespace();
    let command = tokens.next()?;
    let command = command.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    if !command.eq_ignore_ascii_case("tip") {
        return None;
    }
    let recipient = parse_mention(tokens.next()?)?;
    let amount_text = tokens.next()?.to_string();
    if amount_text.starts_with('#') {
        return None;
    }
    let target_draw_id = tokens
        .find(|token| token.starts_with('#') && token.len() > 1)
        .map(normalize_draw_id);

    Some(TipIntent {
        recipient,
        amount_text,
        target_draw_id,
    })
}

fn clean_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '(' | ')' | ',' | '!' | '~'))
        .collect::<String>()
        .trim_end_matches('.')
        .to_string()
}

fn parse_number(token: &str) -> Option<f64> {
    let value: f64 = token.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn is_symbol(token: &str) -> bool {
    (2..=10).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic())
}

/// Finds a USD figure quoted in free text, as `$12.34` or `12.34 USD`.
pub fn embedded_usd_estimate(text: &str) -> Option<f64> {
    let tokens: Vec<String> = text.split_whitespace().map(clean_token).collect();
    tokens.iter().enumerate().find_map(|(i, token)| {
        if let Some(dollars) = token.strip_prefix('$') {
            return parse_number(dollars);
        }
        let next = tokens.get(i + 1)?;
        if next.eq_ignore_ascii_case("USD") {
            return parse_number(token);
        }
        None
    })
}

/// Parses the tipping bot's confirmation, e.g.
/// `<@1> sent <@2> **0.0005 BTC** (≈ $21.37).`
///
/// The first user mention is the sender; the others are recipients.
/// Satoshi amounts are converted to BTC.
pub fn parse_tip_confirmation(text: &str) -> Option<TipConfirmation> {
    let mentions = scan_mentions(text);
    let (&sender_id, recipients) = mentions.users.split_first()?;

    let tokens: Vec<String> = text
        .split_whitespace()
        .filter(|token| !token.starts_with("<@"))
        .map(clean_token)
        .filter(|token| !token.is_empty())
        .collect();

    let mut amount = None;
    let mut usd_estimate = None;
    for (i, token) in tokens.iter().enumerate() {
        if let Some(dollars) = token.strip_prefix('$').and_then(parse_number) {
            usd_estimate.get_or_insert(dollars);
            continue;
        }
        let Some(value) = parse_number(token) else {
            continue;
        };
        let Some(next) = tokens.get(i + 1).filter(|next| is_symbol(next)) else {
            continue;
        };
        let symbol = next.to_uppercase();
        if symbol == "USD" {
            if amount.is_some() {
                usd_estimate.get_or_insert(value);
            }
        } else if amount.is_none() {
            amount = Some((value, symbol));
        }
    }

    let (mut amount, mut symbol) = amount?;
    if matches!(symbol.as_str(), "SATOSHI" | "SATOSHIS" | "SATS" | "SAT") {
        amount /= SATOSHI_PER_BTC;
        symbol = "BTC".to_string();
    }

    Some(TipConfirmation {
        sender_id,
        recipient_ids: recipients.to_vec(),
        role_ids: mentions.roles,
        amount,
        symbol,
        usd_estimate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_with_tag() {
        let intent = parse_tip_intent("$tip <@!42> 5 usdt #Big").unwrap();
        assert_eq!(intent.recipient, Recipient::User(42));
        assert_eq!(intent.amount_text, "5");
        assert_eq!(intent.target_draw_id.as_deref(), Some("big"));
    }

    #[test]
    fn intent_to_a_role_keeps_its_tag() {
        let intent = parse_tip_intent("tip <@&77> 5 #big").unwrap();
        assert_eq!(intent.recipient, Recipient::Role(77));
        assert_eq!(intent.target_draw_id.as_deref(), Some("big"));
        assert!(parse_tip_intent("tip <@&role> 5").is_none());
    }

    #[test]
    fn intent_without_tag() {
        let intent = parse_tip_intent("tip <@42> $3").unwrap();
        assert_eq!(intent.target_draw_id, None);
    }

    #[test]
    fn off_grammar_intents_are_ignored() {
        assert!(parse_tip_intent("tipping <@42> 5").is_none());
        assert!(parse_tip_intent("tip someone 5").is_none());
        assert!(parse_tip_intent("tip <@42>").is_none());
        assert!(parse_tip_intent("tip <@42> #big").is_none());
    }

    #[test]
    fn confirmation_with_estimate() {
        let tip = parse_tip_confirmation("<@1> sent <@2> **0.0005 BTC** (≈ $21.37).").unwrap();
        assert_eq!(tip.sender_id, 1);
        assert_eq!(tip.recipient_ids, vec![2]);
        assert_eq!(tip.amount, 0.0005);
        assert_eq!(tip.symbol, "BTC");
        assert_eq!(tip.usd_estimate, Some(21.37));
    }

    #[test]
    fn confirmation_usd_suffix_estimate() {
        let tip = parse_tip_confirmation("<@1> tipped <@2> 10 usdc (10.00 USD)").unwrap();
        assert_eq!(tip.symbol, "USDC");
        assert_eq!(tip.usd_estimate, Some(10.0));
    }

    #[test]
    fn estimates_are_found_in_free_text() {
        assert_eq!(embedded_usd_estimate("0.1 ETH (≈ $310.50)"), Some(310.5));
        assert_eq!(embedded_usd_estimate("worth 4.20 usd"), Some(4.2));
        assert_eq!(embedded_usd_estimate("0.1 ETH"), None);
    }

    #[test]
    fn satoshi_becomes_btc() {
        let tip = parse_tip_confirmation("<@1> sent <@2> 25000 satoshi").unwrap();
        assert_eq!(tip.symbol, "BTC");
        assert!((tip.amount - 0.00025).abs() < 1e-12);
        assert_eq!(tip.usd_estimate, None);
    }

    #[test]
    fn role_recipients_are_collected() {
        let tip = parse_tip_confirmation("<@1> sent <@&77> 1 SOL").unwrap();
        assert!(tip.recipient_ids.is_empty());
        assert_eq!(tip.role_ids, vec![77]);
        assert_eq!(tip.recipients(), vec![Recipient::Role(77)]);
    }

    #[test]
    fn confirmation_without_amount_is_rejected() {
        assert!(parse_tip_confirmation("<@1> sent <@2> nothing").is_none());
        assert!(parse_tip_confirmation("sent 5 BTC").is_none());
    }
}
