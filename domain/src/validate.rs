//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::{CoreError, NewProduct, NewSite, ProductInput};

/// Longest name accepted for products and sites.
pub const MAX_NAME_LEN: usize = 200;

/// Document ids follow the hosted store's rules: non-empty, at most 1500
/// bytes, no `/`, not `.` or `..`, and not of the reserved form `__*__`.
pub fn validate_document_id(s: &str) -> Result<(), CoreError> {
    if s.is_empty() {
        return Err(CoreError::InvalidId("empty".into()));
    }
    if s.len() > 1500 {
        return Err(CoreError::InvalidId("too long".into()));
    }
    if s.contains('/') {
        return Err(CoreError::InvalidId("must not contain '/'".into()));
    }
    if s == "." || s == ".." {
        return Err(CoreError::InvalidId("'.' and '..' are reserved".into()));
    }
    if s.len() >= 4 && s.starts_with("__") && s.ends_with("__") {
        return Err(CoreError::InvalidId("'__*__' ids are reserved".into()));
    }
    Ok(())
}

/// Trim a name and check it is non-empty and not too long.
pub fn validate_name(s: &str) -> Result<String, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidName("empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::InvalidName("too long".into()));
    }
    Ok(trimmed.to_string())
}

/// Normalize an optional site tag; blank tags become `None`.
pub fn normalize_site(site: Option<String>) -> Option<String> {
    site.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Validate a client product and split off its id.
pub fn validate_product(input: ProductInput) -> Result<(Option<crate::DocumentId>, NewProduct), CoreError> {
    let name = validate_name(&input.name)?;
    if input.quantity == Some(0) {
        return Err(CoreError::InvalidQuantity);
    }
    Ok((
        input.id,
        NewProduct {
            name,
            site: normalize_site(input.site),
            quantity: input.quantity,
            purchased: input.purchased,
        },
    ))
}

pub fn validate_site(site: NewSite) -> Result<NewSite, CoreError> {
    Ok(NewSite {
        name: validate_name(&site.name)?,
    })
}
