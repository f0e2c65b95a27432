/// Normalize columns onto the probability simplex
pub trait MatOps {
    type Mat;
    type Scalar;

    /// `X[,j] = (X[,j] + a) / sum(X[,j] + a)`
    fn sum_to_one_columns_inplace(&mut self, pseudocount: Self::Scalar);
    fn sum_to_one_columns(&self, pseudocount: Self::Scalar) -> Self::Mat;

    /// Centre and scale each column to zero mean and unit variance
    fn scale_columns_inplace(&mut self);
}

/// Column-wise reductions, possibly within groups of columns
pub trait ColumnStatOps {
    type Scalar;
    type Mat;

    /// A vector of column sums
    fn column_sums(&self) -> Vec<Self::Scalar>;

    /// `rows x groups` matrix, where `out[i,k] = sum_{j: g(j) = k} X[i,j]`
    /// * `membership` - group index of each column in `0 .. num_groups`
    /// * `num_groups` - number of groups
    fn sum_columns_by_group(&self, membership: &[usize], num_groups: usize) -> Self::Mat;
}

/// Operations to sample random matrices with an explicit generator
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif<R: rand::Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm<R: rand::Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(file: &str, delim: &[char]) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, &['\t'])
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}
