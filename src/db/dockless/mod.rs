pub mod trips_archive;
