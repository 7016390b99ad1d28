/// Persistence entities for the checkout core
pub mod cart;
pub mod cart_line;
pub mod payment;
pub mod payment_detail;
pub mod payment_status;
pub mod product;
pub mod role;
pub mod stock_record;
pub mod user;
pub mod user_role;

// Re-export entities
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_line::{Entity as CartLine, Model as CartLineModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentMethod};
pub use payment_detail::{Entity as PaymentDetail, Model as PaymentDetailModel};
pub use payment_status::{Entity as PaymentStatus, Model as PaymentStatusModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use role::{Entity as Role, Model as RoleModel};
pub use stock_record::{Entity as StockRecord, Model as StockRecordModel};
pub use user::{Entity as User, Model as UserModel};
pub use user_role::{Entity as UserRole, Model as UserRoleModel};
