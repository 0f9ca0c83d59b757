/// Defines the structured event records rendered by the logger.
pub mod logrecord;
/// Implements the injected local logger with TTY, file and capture output.
pub mod loggerlocal;
