mod object_part_store;

pub use object_part_store::ObjectPartStore;
