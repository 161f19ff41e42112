use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

/// Columns appended by inference; product columns may not take these names.
pub const INFERENCE_COLUMNS: [&str; 2] = ["sentiment", "confidence"];

const COLLISION_SUFFIX: &str = "_product";

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("{frame} table has no column '{column}'")]
    MissingColumn { frame: &'static str, column: String },
    #[error(
        "join key type mismatch: reviews.{review_key} is {review_type} but products.{product_key} is {product_type}"
    )]
    KeyTypeMismatch {
        review_key: String,
        review_type: String,
        product_key: String,
        product_type: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct JoinKeys<'a> {
    pub review_key: &'a str,
    pub product_key: &'a str,
}

#[derive(Debug)]
pub struct JoinOutput {
    pub frame: DataFrame,
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_product_keys: usize,
}

/// Left-joins products onto reviews.
///
/// Every review row appears exactly once and in its original position; reviews without a
/// matching product get nulls in the product columns. Key columns must share a dtype: a string
/// `"1"` never matches an integer `1`. When the product table repeats a key, the first product
/// wins.
pub fn left_join_products(
    reviews: &DataFrame,
    products: &DataFrame,
    keys: JoinKeys<'_>,
) -> Result<JoinOutput, JoinError> {
    if reviews.height() == 0 && reviews.width() == 0 {
        return Ok(JoinOutput {
            frame: reviews.clone(),
            matched: 0,
            unmatched: 0,
            duplicate_product_keys: 0,
        });
    }

    let review_key = reviews
        .column(keys.review_key)
        .map_err(|_| JoinError::MissingColumn {
            frame: "reviews",
            column: keys.review_key.to_string(),
        })?;

    if products.width() == 0 {
        warn!("Product table is empty; every review is unmatched");
        return Ok(JoinOutput {
            frame: reviews.clone(),
            matched: 0,
            unmatched: reviews.height(),
            duplicate_product_keys: 0,
        });
    }

    let product_key = products
        .column(keys.product_key)
        .map_err(|_| JoinError::MissingColumn {
            frame: "products",
            column: keys.product_key.to_string(),
        })?;

    let review_key_all_null = review_key.null_count() == review_key.len();
    if !review_key_all_null && review_key.dtype() != product_key.dtype() {
        return Err(JoinError::KeyTypeMismatch {
            review_key: keys.review_key.to_string(),
            review_type: review_key.dtype().to_string(),
            product_key: keys.product_key.to_string(),
            product_type: product_key.dtype().to_string(),
        });
    }

    let product_key_text = product_key.cast(&DataType::String)?;
    let product_keys = product_key_text.str()?;

    let mut index: HashMap<&str, IdxSize> = HashMap::with_capacity(products.height());
    let mut duplicate_product_keys = 0usize;
    for (row, key) in product_keys.into_iter().enumerate() {
        let Some(key) = key else {
            continue;
        };
        match index.entry(key) {
            Entry::Occupied(_) => duplicate_product_keys += 1,
            Entry::Vacant(slot) => {
                slot.insert(row as IdxSize);
            }
        }
    }

    if duplicate_product_keys > 0 {
        warn!(
            duplicates = duplicate_product_keys,
            key = keys.product_key,
            "Product table repeats join keys; keeping the first occurrence"
        );
    }

    let review_key_text = review_key.cast(&DataType::String)?;
    let positions: Vec<Option<IdxSize>> = review_key_text
        .str()?
        .into_iter()
        .map(|key| key.and_then(|key| index.get(key).copied()))
        .collect();
    let matched = positions.iter().filter(|pos| pos.is_some()).count();
    let unmatched = positions.len() - matched;

    let mut product_side = if keys.review_key == keys.product_key {
        products.drop(keys.product_key)?
    } else {
        products.clone()
    };

    let mut taken: HashSet<String> = reviews
        .get_column_names()
        .into_iter()
        .chain(product_side.get_column_names())
        .map(|name| name.to_string())
        .chain(INFERENCE_COLUMNS.iter().map(|name| name.to_string()))
        .collect();
    let colliding: Vec<String> = product_side
        .get_column_names()
        .into_iter()
        .filter(|name| {
            reviews.column(name.as_str()).is_ok() || INFERENCE_COLUMNS.contains(&name.as_str())
        })
        .map(|name| name.to_string())
        .collect();
    let mut renames = Vec::with_capacity(colliding.len());
    for old in colliding {
        let mut new = format!("{old}{COLLISION_SUFFIX}");
        while taken.contains(&new) {
            new.push_str(COLLISION_SUFFIX);
        }
        taken.insert(new.clone());
        renames.push((old, new));
    }
    for (old, new) in renames {
        debug!(column = %old, renamed = %new, "Renaming colliding product column");
        product_side.rename(&old, new.into())?;
    }

    let rows = IdxCa::from_iter_options("product_row".into(), positions.into_iter());
    let gathered = product_side.take(&rows)?;
    let frame = reviews.hstack(gathered.get_columns())?;

    Ok(JoinOutput {
        frame,
        matched,
        unmatched,
        duplicate_product_keys,
    })
}
