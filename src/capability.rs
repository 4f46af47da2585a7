//! The contract shared by everything offered and accepted during a handshake.
//!
//! Sub-protocols and extensions both advertise a token, accept or reject the
//! peer's comma-separated offer list, and hand out fresh per-connection
//! copies of themselves.

/// Iterate over the names in a comma-separated offer header.
///
/// Each element is cut at its first `;` (extension parameters), trimmed, and
/// skipped if empty.
pub fn offered_tokens(header: &str) -> impl Iterator<Item = &str> {
    header
        .split(',')
        .map(|element| element.split_once(';').map_or(element, |(name, _)| name).trim())
        .filter(|token| !token.is_empty())
}

/// True if `token` appears in `header`, ignoring ASCII case and surrounding whitespace.
pub fn offer_contains(header: &str, token: &str) -> bool {
    !token.is_empty() && offered_tokens(header).any(|t| t.eq_ignore_ascii_case(token))
}

/// Join the non-empty offers into one header value.
///
/// Returns `None` when every offer is empty, in which case the header must
/// be left out of the handshake entirely.
pub fn join_offers<I>(offers: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let joined = offers
        .into_iter()
        .filter(|offer| !offer.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

/// Something that is offered and accepted during the opening handshake.
///
/// An empty provided offer means "do not advertise"; the negotiator omits
/// it from the outgoing header.
pub trait Negotiable: Send {
    /// The registered token (e.g. `permessage-deflate`, `chat.v2`).
    fn token(&self) -> &str;

    /// Whether this capability accepts the client's offer header (server side).
    fn accept_offer_as_server(&mut self, offer: &str) -> bool {
        offer_contains(offer, self.token())
    }

    /// Whether this capability accepts the server's selection header (client side).
    fn accept_offer_as_client(&mut self, offer: &str) -> bool {
        offer_contains(offer, self.token())
    }

    /// What the server advertises in its response.
    fn provided_offer_as_server(&self) -> String {
        self.token().to_owned()
    }

    /// What the client advertises in its request.
    fn provided_offer_as_client(&self) -> String {
        self.token().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_trim_and_drop_params() {
        let tokens: Vec<&str> =
            offered_tokens(" permessage-deflate; client_max_window_bits ,foo,, bar ").collect();
        assert_eq!(tokens, vec!["permessage-deflate", "foo", "bar"]);
    }

    #[test]
    fn test_offer_contains_is_case_insensitive() {
        assert!(offer_contains("Permessage-Deflate , foo", "permessage-deflate"));
        assert!(offer_contains("  permessage-deflate", "permessage-deflate"));
        assert!(!offer_contains("foo, bar", "permessage-deflate"));
        assert!(!offer_contains("permessage-deflate-x", "permessage-deflate"));
    }

    #[test]
    fn test_empty_token_never_matches() {
        assert!(!offer_contains("", ""));
        assert!(!offer_contains("a, , b", ""));
    }

    #[test]
    fn test_join_offers_suppresses_empty() {
        assert_eq!(
            join_offers(vec!["a".to_string(), String::new(), "b".to_string()]),
            Some("a, b".to_string())
        );
        assert_eq!(join_offers(vec![String::new()]), None);
        assert_eq!(join_offers(Vec::new()), None);
    }
}
