pub mod jobservice;
