use instant_distance::{Builder, HnswMap, Search};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt::{Debug, Display};

/// A dictionary (HnswMap wrapper) for fast column look-up
///
pub struct ColumnDict<T> {
    pub dict: HnswMap<VecPoint, T>,
    pub data_vec: Vec<VecPoint>,
    pub name2index: HashMap<T, usize>,
}

impl<T> ColumnDict<T>
where
    T: Clone + Eq + std::hash::Hash + Debug + Display + Send + Sync,
{
    /// Index the columns with a seeded HNSW graph
    ///
    /// * `data` - one view per column
    /// * `names` - name of each column
    /// * `seed` - seed of the layer assignment
    ///
    pub fn from_dvector_views(
        data: Vec<nalgebra::DVectorView<f32>>,
        names: Vec<T>,
        seed: u64,
    ) -> anyhow::Result<Self> {
        if data.len() != names.len() {
            return Err(anyhow::anyhow!(
                "{} columns but {} names",
                data.len(),
                names.len()
            ));
        }

        let data_vec: Vec<VecPoint> = data.par_iter().map(|x| x.to_vp()).collect();

        let name2index: HashMap<T, usize> = names
            .iter()
            .enumerate()
            .map(|(j, x)| (x.clone(), j))
            .collect();

        let dict = Builder::default()
            .seed(seed)
            .build(data_vec.clone(), names);

        Ok(ColumnDict {
            dict,
            data_vec,
            name2index,
        })
    }

    pub fn len(&self) -> usize {
        self.data_vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_vec.is_empty()
    }

    /// Names and distances of the `knn` columns closest to `query`,
    /// closest first
    pub fn search_by_query(&self, query: &VecPoint, knn: usize) -> (Vec<T>, Vec<f32>) {
        let mut search = Search::default();
        self.dict
            .search(query, &mut search)
            .take(knn.min(self.len()))
            .map(|item| (item.value.clone(), item.distance))
            .unzip()
    }

    /// k-nearest neighbours of a column, the column itself excluded
    ///
    /// * `query_name` - the name of the column to match
    /// * `knn` - the number of nearest neighbours to return
    ///
    pub fn search_others(
        &self,
        query_name: &T,
        knn: usize,
    ) -> anyhow::Result<(Vec<T>, Vec<f32>)> {
        let &self_idx = self
            .name2index
            .get(query_name)
            .ok_or_else(|| anyhow::anyhow!("name {} not found", query_name))?;

        let (names, distances) = self.search_by_query(&self.data_vec[self_idx], knn + 1);

        Ok(names
            .into_iter()
            .zip(distances)
            .filter(|(x, _)| x != query_name)
            .take(knn)
            .unzip())
    }
}

#[derive(Clone, Debug)]
/// a wrapper for Vec<f32>
pub struct VecPoint {
    pub data: Vec<f32>,
}

pub trait MakeVecPoint {
    fn to_vp(&self) -> VecPoint;
}

impl MakeVecPoint for nalgebra::DVectorView<'_, f32> {
    fn to_vp(&self) -> VecPoint {
        VecPoint {
            data: self.iter().cloned().collect(),
        }
    }
}

impl instant_distance::Point for VecPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn nearest_columns_exclude_self() -> anyhow::Result<()> {
        // points on a line at 0, 1, 3, 7
        let xx = DMatrix::<f32>::from_row_slice(1, 4, &[0., 1., 3., 7.]);
        let names: Vec<usize> = (0..4).collect();
        let dict = ColumnDict::from_dvector_views(xx.column_iter().collect(), names, 1)?;

        let (names, distances) = dict.search_others(&1, 2)?;
        assert_eq!(names, vec![0, 2]);
        assert_eq!(distances, vec![1., 2.]);

        let (names, _) = dict.search_by_query(&xx.column(3).to_vp(), 1);
        assert_eq!(names, vec![3]);

        assert!(dict.search_others(&9, 1).is_err());
        Ok(())
    }
}
