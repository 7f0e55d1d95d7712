/// 價格動能
pub mod momentum;
