pub mod catalog;
pub mod merch_order;
pub mod order_intent;
pub mod payment_record;
pub mod purchase;
pub mod refund_request;
pub mod subscription;
