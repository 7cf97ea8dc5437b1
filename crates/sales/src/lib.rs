//! Sales domain module.
//!
//! Point-of-sale transactions (lines, discounts, payments), quantity
//! discounts and payment-method fees. Deterministic domain logic only.

pub mod discount;
pub mod payment_method;
pub mod sale;

pub use discount::{Discount, DiscountId};
pub use payment_method::{PaymentMethod, PaymentMethodId, REL_FEE_SCALE};
pub use sale::{
    AddPayment, AddSaleLine, ApplyDiscount, CreateSale, DiscardSale, PostSale, RemovePayment,
    RemoveSaleLine, Sale, SaleCommand, SaleDiscount, SaleEvent, SaleId, SaleLine, SalePayment,
};
