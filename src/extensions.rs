pub mod csv_export;
pub mod workload_gen;
