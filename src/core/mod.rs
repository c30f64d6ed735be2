pub mod dataview;
pub mod formula;
pub mod lifecycle;

pub use dataview::{DataView, FormulaOptions};
pub use formula::{Formula, FunctionTable, NameStyle};
pub use lifecycle::{AppendOutcome, FieldLifecycle, PanelState};
