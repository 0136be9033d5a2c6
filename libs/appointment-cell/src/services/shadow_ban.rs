// libs/appointment-cell/src/services/shadow_ban.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

/// Digits only, so `+55 (11) 99999-0000` and `5511999990000` match.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Whether any `blocked_phones` row holds `digits`, however the row was
/// formatted when it was stored.
fn lists_phone(rows: &[Value], digits: &str) -> bool {
    rows.iter()
        .filter_map(|row| row["phone"].as_str())
        .any(|phone| normalize_phone(phone) == digits)
}

pub struct ShadowBanService {
    supabase: Arc<SupabaseClient>,
}

impl ShadowBanService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Whether the clinic blocked this phone. A failed lookup lets the
    /// booking through.
    pub async fn is_blocked(&self, clinic_id: Uuid, phone: &str, auth_token: &str) -> bool {
        let digits = normalize_phone(phone);
        if digits.is_empty() {
            return false;
        }

        let path = format!("/rest/v1/blocked_phones?clinic_id=eq.{}&select=phone", clinic_id);

        match self.supabase.request::<Vec<Value>>(Method::GET, &path, Some(auth_token), None).await {
            Ok(rows) if lists_phone(&rows, &digits) => {
                info!("Blocked phone attempted booking at clinic {}", clinic_id);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Blocked phone lookup failed for clinic {}: {}", clinic_id, e);
                false
            }
        }
    }
}
