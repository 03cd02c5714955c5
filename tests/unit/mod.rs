pub mod assembler;
pub mod capacity;
pub mod faults;
pub mod hazards;
pub mod timing;
