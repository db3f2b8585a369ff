pub mod libujian;
