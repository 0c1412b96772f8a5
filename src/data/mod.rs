// src/data/mod.rs

pub mod product;
pub mod store;
pub mod vehicle_store;

pub use product::{BookFields, FilterMap, LaptopFields, Product, RankingAnnotations, VehicleFields};
pub use store::{ProductQuery, ProductStore};
pub use vehicle_store::VehicleStore;
