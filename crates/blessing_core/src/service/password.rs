//! Unlock code synthesis.

use crate::model::blessing::PASSWORD_LEN;
use rand::Rng;

const PASSWORD_SPACE: u32 = 10_000;

/// Draws a fresh, uniformly distributed 4-digit code.
pub fn synthesize_password() -> String {
    synthesize_password_with(&mut rand::thread_rng())
}

pub fn synthesize_password_with<G: Rng + ?Sized>(rng: &mut G) -> String {
    let code = rng.gen_range(0..PASSWORD_SPACE);
    format!("{code:0width$}", width = PASSWORD_LEN)
}
