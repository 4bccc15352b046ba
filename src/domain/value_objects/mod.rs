//! Value Objects for the storefront catalog and checkout

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Bangladeshi mobile numbers, with or without the `+88` / `88` country prefix.
pub static BD_MOBILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\+?88)?01[3-9]\d{8}$").expect("valid mobile pattern"));

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub const MAX_LENGTH: usize = 50;

    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > Self::MAX_LENGTH { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }

    /// Random `SKU-XXXXXXXX` code for products submitted without one.
    pub fn generate() -> Self {
        Self(format!("SKU-{:08}", rand::thread_rng().gen_range(0..100_000_000u32)))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU cannot be empty")]
    Empty,
    #[error("SKU must be at most 50 characters")]
    TooLong,
}

/// Derive a URL-safe identifier from a human readable name.
///
/// Decomposes the input (NFKD) and drops combining marks so accented letters
/// keep their base letter, lowercases, removes everything outside
/// `[a-z0-9]`, whitespace and `-`, then joins the remaining words with single
/// hyphens. Leading and trailing separators never survive.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut separator = false;

    for c in name.nfkd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if separator && !out.is_empty() {
                out.push('-');
            }
            separator = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            separator = true;
        }
    }

    out
}

/// A catalog slug. Always in the normal form produced by [`slugify`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Slug derived from a product name.
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let slug = slugify(name);
        if slug.is_empty() { return Err(SlugError::Empty); }
        Ok(Self(slug))
    }

    /// Accepts an explicit slug, normalising it the same way a name would be.
    pub fn parse(value: &str) -> Result<Self, SlugError> { Self::from_name(value) }

    /// Disambiguated variant used when the derived slug is already taken.
    pub fn with_suffix(&self, n: u32) -> Self { Self(format!("{}-{n}", self.0)) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self { slug.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug has no URL-safe characters")]
    Empty,
}

/// Customer mobile number, validated against the Bangladeshi pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MobileNumber(String);

impl MobileNumber {
    pub fn parse(value: &str) -> Result<Self, MobileError> {
        let value = value.trim();
        if !BD_MOBILE.is_match(value) { return Err(MobileError::Invalid(value.to_string())); }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for MobileNumber {
    type Error = MobileError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<MobileNumber> for String {
    fn from(m: MobileNumber) -> Self { m.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MobileError {
    #[error("invalid mobile number: {0}")]
    Invalid(String),
}

/// Largest money amount a stored price or total may hold (`NUMERIC(14, 2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Minor-unit precision of stored amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Checks that `value` is a storable money amount: non-negative, at most two
/// decimal places and no larger than [`MAX_AMOUNT`].
pub fn check_amount(value: Decimal) -> Result<Decimal, AmountError> {
    if value.is_sign_negative() && !value.is_zero() { return Err(AmountError::Negative); }
    if value.normalize().scale() > AMOUNT_SCALE { return Err(AmountError::TooPrecise); }
    if value > MAX_AMOUNT { return Err(AmountError::TooLarge); }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("must not be negative")]
    Negative,
    #[error("must have at most 2 decimal places")]
    TooPrecise,
    #[error("must not exceed 999999999999.99")]
    TooLarge,
}

impl AmountError {
    /// Validation code reported for this failure.
    pub fn code(self) -> &'static str {
        match self { Self::Negative => "non_negative", Self::TooPrecise => "scale", Self::TooLarge => "range" }
    }
}
