pub mod limiter_table;
