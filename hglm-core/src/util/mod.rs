pub mod imputation;
