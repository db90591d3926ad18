use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    Text,
    Image,
    Boolean,
    Number,
}

/// One key/value row of the `site_settings` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSetting {
    pub id: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: SettingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderOption {
    #[default]
    OrderViaMessenger,
    PlaceOrder,
}

impl OrderOption {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "order_via_messenger" => Some(OrderOption::OrderViaMessenger),
            "place_order" => Some(OrderOption::PlaceOrder),
            _ => None,
        }
    }
}

pub const DEFAULT_NOTIFICATION_VOLUME: f64 = 0.5;

/// Site-wide configuration, assembled from [`SiteSetting`] rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_logo: String,
    pub site_description: String,
    pub currency: String,
    pub currency_code: String,
    /// Facebook
    pub footer_social_1: Option<String>,
    /// Instagram
    pub footer_social_2: Option<String>,
    /// Twitter/X
    pub footer_social_3: Option<String>,
    /// YouTube
    pub footer_social_4: Option<String>,
    pub footer_support_url: Option<String>,
    pub order_option: OrderOption,
    /// 0.0 - 1.0
    pub notification_volume: f64,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: String::new(),
            site_logo: String::new(),
            site_description: String::new(),
            currency: String::new(),
            currency_code: String::new(),
            footer_social_1: None,
            footer_social_2: None,
            footer_social_3: None,
            footer_social_4: None,
            footer_support_url: None,
            order_option: OrderOption::default(),
            notification_volume: DEFAULT_NOTIFICATION_VOLUME,
        }
    }
}

impl SiteSettings {
    /// Fold key/value rows into the settings record. Unknown keys are
    /// ignored; unparsable values keep the default.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a SiteSetting>) -> Self {
        let mut settings = SiteSettings::default();
        for row in rows {
            let value = row.value.clone();
            let link = || {
                let v = row.value.trim();
                (!v.is_empty()).then(|| v.to_string())
            };
            match row.id.as_str() {
                "site_name" => settings.site_name = value,
                "site_logo" => settings.site_logo = value,
                "site_description" => settings.site_description = value,
                "currency" => settings.currency = value,
                "currency_code" => settings.currency_code = value,
                "footer_social_1" => settings.footer_social_1 = link(),
                "footer_social_2" => settings.footer_social_2 = link(),
                "footer_social_3" => settings.footer_social_3 = link(),
                "footer_social_4" => settings.footer_social_4 = link(),
                "footer_support_url" => settings.footer_support_url = link(),
                "order_option" => {
                    if let Some(option) = OrderOption::parse(&row.value) {
                        settings.order_option = option;
                    }
                }
                "notification_volume" => {
                    if let Ok(v) = row.value.trim().parse::<f64>() {
                        settings.notification_volume = v.clamp(0.0, 1.0);
                    }
                }
                other => tracing::debug!(key = other, "ignoring unknown site setting"),
            }
        }
        settings
    }

    pub fn social_links(&self) -> impl Iterator<Item = &str> {
        [
            &self.footer_social_1,
            &self.footer_social_2,
            &self.footer_social_3,
            &self.footer_social_4,
        ]
        .into_iter()
        .filter_map(|l| l.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, value: &str, kind: SettingType) -> SiteSetting {
        SiteSetting {
            id: id.into(),
            value: value.into(),
            kind,
            description: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_rows_maps_known_keys() {
        let rows = vec![
            row("site_name", "Kape Corner", SettingType::Text),
            row("currency", "₱", SettingType::Text),
            row("currency_code", "PHP", SettingType::Text),
            row("footer_support_url", "https://m.me/kape", SettingType::Text),
            row("footer_social_2", "  ", SettingType::Text),
            row("order_option", "place_order", SettingType::Text),
            row("notification_volume", "0.8", SettingType::Number),
            row("theme_color", "#fff", SettingType::Text),
        ];
        let settings = SiteSettings::from_rows(&rows);

        assert_eq!(settings.site_name, "Kape Corner");
        assert_eq!(settings.currency_code, "PHP");
        assert_eq!(settings.footer_support_url.as_deref(), Some("https://m.me/kape"));
        assert_eq!(settings.footer_social_2, None);
        assert_eq!(settings.order_option, OrderOption::PlaceOrder);
        assert_eq!(settings.notification_volume, 0.8);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let rows = vec![
            row("notification_volume", "loud", SettingType::Number),
            row("order_option", "carrier_pigeon", SettingType::Text),
        ];
        let settings = SiteSettings::from_rows(&rows);
        assert_eq!(settings.notification_volume, DEFAULT_NOTIFICATION_VOLUME);
        assert_eq!(settings.order_option, OrderOption::OrderViaMessenger);
    }

    #[test]
    fn test_setting_row_json() {
        let parsed: SiteSetting = serde_json::from_value(serde_json::json!({
            "id": "site_logo",
            "value": "https://cdn/logo.png",
            "type": "image",
            "updated_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(parsed.kind, SettingType::Image);
    }
}
