mod ledger;
mod manufacturer;
mod product;
mod shortlink;

pub use ledger::{PointsLedgerEvent, StoredLedgerEvent};
pub use manufacturer::{Manufacturer, ManufacturerRatingInput};
pub use product::{Moderation, Product, ProductStatus, ProductWithRanking};
pub use shortlink::{CreateShortlinkRequest, LinkClickEvent, Shortlink};

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Random alphanumeric identifier, used for event ids and generated short codes
pub fn generate_id(len: usize) -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
