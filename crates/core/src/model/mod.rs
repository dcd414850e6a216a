//! In-memory PDF value types and graphics state.

pub mod objects;
pub mod state;

pub use objects::{
    PdfDict, PdfObject, PdfStream, dict_value, matrix_value, num_value, rect_value,
};
pub use state::{CapStyle, Color, DashPattern, GraphicsState, JoinStyle, TextState};
