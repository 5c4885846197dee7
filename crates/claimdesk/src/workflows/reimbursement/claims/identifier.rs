//! Claim number generation: `<INITIALS><YYYYMMDD><SEQ>`.
//!
//! The sequence is recomputed from the claims currently known, so two generations made
//! from the same stale snapshot can collide. The service guards against that by letting
//! the store reject duplicate numbers and retrying from a fresh listing.

use chrono::NaiveDate;
use pinyin::ToPinyin;

use super::domain::{Claim, ClaimNumber, User};

const MAX_INITIALS: usize = 5;

/// Initials for a user: pinyin first letters of the display name, or the login name.
pub fn initials_for(user: &User) -> String {
    let transliterated = user
        .display_name
        .as_deref()
        .map(transliterate_initials)
        .unwrap_or_default();

    if transliterated.is_empty() {
        login_initials(&user.username)
    } else {
        transliterated
    }
}

fn transliterate_initials(name: &str) -> String {
    let mut initials = String::new();
    for ch in name.trim().chars() {
        if initials.chars().count() == MAX_INITIALS {
            break;
        }
        if let Some(reading) = ch.to_pinyin() {
            initials.push_str(&reading.first_letter().to_ascii_uppercase());
        } else if ch.is_ascii_alphanumeric() {
            initials.push(ch.to_ascii_uppercase());
        }
    }
    initials
}

fn login_initials(username: &str) -> String {
    username
        .trim()
        .chars()
        .take(MAX_INITIALS)
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn prefix_for(user: &User, today: NaiveDate) -> String {
    format!("{}{}", initials_for(user), today.format("%Y%m%d"))
}

/// Next claim number for `user` on `today` given every claim known so far.
pub fn next_claim_number<'a, I>(user: &User, existing: I, today: NaiveDate) -> ClaimNumber
where
    I: IntoIterator<Item = &'a Claim>,
{
    let prefix = prefix_for(user, today);
    let issued = existing
        .into_iter()
        .filter(|claim| claim.claim_number.as_str().starts_with(&prefix))
        .count();
    ClaimNumber(format!("{prefix}{:03}", issued + 1))
}
