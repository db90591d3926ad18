//! Floating customer-support button: vertical placement and click handling.
//!
//! The button normally floats [`DEFAULT_BOTTOM`] px above the viewport bottom.
//! When that would put it on or below the footer separator it is locked
//! [`MIN_SPACING`] px above the separator instead. Placement is recomputed on
//! every scroll and once [`SETTLE_DELAY`] after mount.

use std::time::Duration;

use crate::models::SiteSettings;

pub const DEFAULT_BOTTOM: f64 = 24.0;
pub const MIN_SPACING: f64 = 16.0;
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Element id of the layout boundary the button must stay above
pub const SEPARATOR_ID: &str = "footer-separator";
pub const UNCONFIGURED_ALERT: &str =
    "Support URL is not configured. Please contact the administrator.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Default,
    /// Locked above the separator at this bottom offset
    Locked(f64),
}

impl Placement {
    pub fn bottom(&self) -> f64 {
        match self {
            Placement::Default => DEFAULT_BOTTOM,
            Placement::Locked(bottom) => *bottom,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Placement::Locked(_))
    }
}

/// Placement for a viewport of `viewport_height` px whose separator's top
/// edge sits at `separator_top` px from the viewport top (`None` when the
/// page has no separator).
pub fn bottom_offset(viewport_height: f64, separator_top: Option<f64>) -> Placement {
    let Some(separator_top) = separator_top else {
        return Placement::Default;
    };
    let button_at_default = viewport_height - DEFAULT_BOTTOM;
    if button_at_default >= separator_top - MIN_SPACING {
        let locked = viewport_height - separator_top + MIN_SPACING;
        Placement::Locked(locked.max(MIN_SPACING))
    } else {
        Placement::Default
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupportLink {
    Configured(String),
    Unconfigured,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Open in a new tab
    Navigate { url: String },
    /// Navigation prevented; show a blocking alert
    Blocked { alert: &'static str },
}

impl SupportLink {
    pub fn from_settings(settings: Option<&SiteSettings>) -> Self {
        match settings.and_then(|s| s.footer_support_url.as_deref()) {
            Some(url) if !url.trim().is_empty() && url.trim() != "#" => {
                SupportLink::Configured(url.to_string())
            }
            _ => SupportLink::Unconfigured,
        }
    }

    /// `href` to render; `#` when nothing is configured.
    pub fn href(&self) -> &str {
        match self {
            SupportLink::Configured(url) => url,
            SupportLink::Unconfigured => "#",
        }
    }

    pub fn click(&self) -> ClickOutcome {
        match self {
            SupportLink::Configured(url) => ClickOutcome::Navigate { url: url.clone() },
            SupportLink::Unconfigured => ClickOutcome::Blocked {
                alert: UNCONFIGURED_ALERT,
            },
        }
    }
}

/// Hidden while site settings are still loading.
pub fn visible(settings_loading: bool) -> bool {
    !settings_loading
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_separator_uses_default() {
        assert_eq!(bottom_offset(800.0, None), Placement::Default);
        assert_eq!(bottom_offset(800.0, None).bottom(), 24.0);
    }

    #[test]
    fn test_separator_far_below_keeps_default() {
        // separator below the fold
        assert_eq!(bottom_offset(800.0, Some(1500.0)), Placement::Default);
        // just clear of the threshold: 776 < 793 - 16
        assert_eq!(bottom_offset(800.0, Some(793.0)), Placement::Default);
    }

    #[test]
    fn test_separator_in_view_locks_above_it() {
        // 776 >= 792 - 16, exactly on the threshold
        let p = bottom_offset(800.0, Some(792.0));
        assert_eq!(p, Placement::Locked(24.0));

        let p = bottom_offset(800.0, Some(500.0));
        assert!(p.is_locked());
        assert_eq!(p.bottom(), 316.0);
    }

    #[test]
    fn test_locked_offset_tracks_separator() {
        let p = bottom_offset(800.0, Some(790.0));
        assert_eq!(p.bottom(), 26.0);
        let p = bottom_offset(800.0, Some(0.0));
        assert_eq!(p.bottom(), 816.0);
    }

    #[test]
    fn test_support_link_configuration() {
        let mut settings = SiteSettings::default();
        assert_eq!(SupportLink::from_settings(None), SupportLink::Unconfigured);
        assert_eq!(SupportLink::from_settings(Some(&settings)), SupportLink::Unconfigured);

        settings.footer_support_url = Some("   ".into());
        assert_eq!(SupportLink::from_settings(Some(&settings)), SupportLink::Unconfigured);

        settings.footer_support_url = Some("#".into());
        let link = SupportLink::from_settings(Some(&settings));
        assert_eq!(link.href(), "#");
        assert_eq!(
            link.click(),
            ClickOutcome::Blocked {
                alert: UNCONFIGURED_ALERT
            }
        );

        settings.footer_support_url = Some("https://m.me/shop".into());
        let link = SupportLink::from_settings(Some(&settings));
        assert_eq!(
            link.click(),
            ClickOutcome::Navigate {
                url: "https://m.me/shop".into()
            }
        );
    }

    #[test]
    fn test_support_link_keeps_stored_url() {
        let settings = SiteSettings {
            footer_support_url: Some(" https://m.me/shop ".into()),
            ..Default::default()
        };
        let link = SupportLink::from_settings(Some(&settings));
        assert_eq!(link.href(), " https://m.me/shop ");
    }

    #[test]
    fn test_hidden_while_loading() {
        assert!(!visible(true));
        assert!(visible(false));
    }
}
