mod program_builder;
mod simulator;
