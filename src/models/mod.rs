pub mod de;
pub mod menu;
pub mod order;
pub mod settings;

pub use menu::{AddOn, CartItem, CustomField, MenuItem, Variation};
pub use order::{sort_newest_first, CreateOrderData, CustomerInfo, NewOrder, Order, OrderRow, OrderStatus};
pub use settings::{OrderOption, SettingType, SiteSetting, SiteSettings};
