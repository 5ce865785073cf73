pub mod measurement_block;
