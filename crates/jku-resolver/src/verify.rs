//! End-to-end token verification through a [`KeyResolver`].

use crate::error::VerifyError;
use crate::header::TokenHeader;
use crate::resolver::KeyResolver;
use jsonwebtoken::{decode, TokenData, Validation};
use serde::de::DeserializeOwned;
use tracing::instrument;

/// Verify `token` with the key `resolver` selects and decode its claims.
///
/// The header is parsed (size-checked) first, the key is resolved from it,
/// then the signature and registered claims are checked against
/// `validation`. The algorithm list in `validation` is enforced by
/// `jsonwebtoken` in addition to any check the resolver makes.
///
/// # Errors
///
/// - `VerifyError::Header` - token is oversized or not a well-formed JWT
/// - `VerifyError::Key` - no key could be resolved
/// - `VerifyError::Verification` - bad signature, expired, wrong algorithm
#[instrument(skip_all)]
pub async fn decode_verified<T: DeserializeOwned>(
    token: &str,
    resolver: &dyn KeyResolver,
    validation: &Validation,
) -> Result<TokenData<T>, VerifyError> {
    let header = TokenHeader::parse(token)?;
    let key = resolver.resolve(&header).await?;

    decode::<T>(token, &key, validation).map_err(|e| {
        tracing::debug!(target: "jku.verify", error = %e, "Token signature or claims rejected");
        VerifyError::Verification(e)
    })
}
