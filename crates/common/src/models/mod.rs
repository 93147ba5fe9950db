pub mod account;
pub mod market;
pub mod order;
pub mod plan;
pub mod position;
pub mod report;
pub mod signal;

pub use account::AccountSnapshot;
pub use market::{Article, DailyBar, PricePrediction, Sentiment, SentimentLabel, SignalContext};
pub use order::{OrderReceipt, OrderSide, PendingOrder};
pub use plan::{AllocationAction, AllocationPlan};
pub use position::Position;
pub use report::{CycleReport, ExecutedAction, ExecutionReport, FailedAction};
pub use signal::{SignalAction, SignalCategory, SignalSet, TradeSignal};
