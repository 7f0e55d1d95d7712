/// 價格動能提醒
pub mod momentum;
