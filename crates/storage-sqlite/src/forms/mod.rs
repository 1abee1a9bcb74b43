mod repository;

pub use repository::FormTableRepository;
