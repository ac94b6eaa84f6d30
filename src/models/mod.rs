pub mod user;
pub mod seat;
pub mod order;
pub mod payme;

pub use user::User;
pub use seat::{Seat, SeatStatus};
pub use order::{
    HoldWindow, LineItem, NewLineItem, NewOrder, Order, OrderStatus, PaymentType, TransactionState,
};
