//! Pipeline reanudable que convierte un árbol de escaneos agrupados por
//! carpeta en un dataset espejado (texto, categoría, tipo, info, títulos y
//! resúmenes por idioma) y equilibra las categorías con variantes sintéticas.

pub mod augment;
pub mod capabilities;
pub mod config;
pub mod errors;
pub mod history;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod quota;
pub mod scanner;
