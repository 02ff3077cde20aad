pub mod procfs;
