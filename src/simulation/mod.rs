mod calcium;

pub use calcium::{CalciumCellSpec, generate_recording, grid_positions};
