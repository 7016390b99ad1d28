/// Checkout coordination services
pub mod cart;
pub mod payment;
pub mod reference;
pub mod stock;

pub use cart::CartService;
pub use payment::PaymentService;
pub use reference::ReferenceGenerator;
pub use stock::StockLedgerService;
