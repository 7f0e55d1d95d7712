/// 追蹤報價
pub mod trace;
