pub mod payment;
pub mod vnpay;
