//! Caption policy applied to every relayed item.
//!
//! Clean mode wins over everything. Otherwise the custom caption (if it still
//! has shots left) is prepended and the join footer appended when enabled.

use crate::db::{self, Pool};
use crate::model::SettingKey;
use anyhow::Result;
use tracing::{debug, instrument};

/// Footer linking to the promoted chat.
pub fn join_footer(link: &str) -> String {
    format!("For More Video <a href='{}'>Join Here</a>", link)
}

/// Assemble a caption from its optional parts.
pub fn render_caption(custom_text: Option<&str>, join_link: Option<&str>) -> String {
    let mut caption = String::new();
    if let Some(text) = custom_text {
        caption.push_str(text);
        caption.push_str("\n\n");
    }
    if let Some(link) = join_link {
        caption.push_str(&join_footer(link));
    }
    caption
}

/// Compose the caption for the next delivered item.
///
/// Consumes one shot of a counted custom caption, so it must run once per
/// item; the relay worker caches the result across rate-limit retries.
#[instrument(skip_all)]
pub async fn compose(pool: &Pool) -> Result<String> {
    if db::get_flag(pool, SettingKey::TotalOff).await? {
        debug!("clean mode, empty caption");
        return Ok(String::new());
    }

    let custom = db::claim_custom_caption(pool).await?;
    let link = if db::get_flag(pool, SettingKey::JoinEnabled).await? {
        db::get_setting(pool, SettingKey::Link).await?
    } else {
        None
    };
    Ok(render_caption(custom.as_deref(), link.as_deref()))
}
