/// Lazy k-subsets of a slice in lexicographic index order.
///
/// Each call starts from the first subset. `k > items.len()` yields nothing;
/// `k == 0` yields a single empty subset.
pub fn combinations_of<T: Clone>(items: &[T], k: usize) -> Combinations<'_, T> {
    Combinations {
        items,
        indices: (0..k).collect(),
        done: k > items.len(),
    }
}

/// Lazy Cartesian product, row-major with the last list varying fastest.
///
/// Empty if any input list is empty. The product of zero lists is a single
/// empty row.
pub fn cartesian_product<T: Clone>(lists: &[Vec<T>]) -> CartesianProduct<'_, T> {
    CartesianProduct {
        lists,
        cursor: vec![0; lists.len()],
        done: lists.iter().any(|list| list.is_empty()),
    }
}

pub struct Combinations<'a, T> {
    items: &'a [T],
    indices: Vec<usize>,
    done: bool,
}

impl<T: Clone> Iterator for Combinations<'_, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = self.indices.iter().map(|&i| self.items[i].clone()).collect();

        // Rightmost index that can still move forward
        let n = self.items.len();
        let k = self.indices.len();
        match (0..k).rev().find(|&i| self.indices[i] != n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }

        Some(current)
    }
}

pub struct CartesianProduct<'a, T> {
    lists: &'a [Vec<T>],
    cursor: Vec<usize>,
    done: bool,
}

impl<T: Clone> Iterator for CartesianProduct<'_, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let row = self
            .cursor
            .iter()
            .zip(self.lists)
            .map(|(&i, list)| list[i].clone())
            .collect();

        // Odometer step, last position first
        self.done = true;
        for pos in (0..self.lists.len()).rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.lists[pos].len() {
                self.done = false;
                break;
            }
            self.cursor[pos] = 0;
        }

        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_element_subsets() {
        let items = vec!["x", "y", "z"];
        let subsets: Vec<_> = combinations_of(&items, 1).collect();
        assert_eq!(subsets, vec![vec!["x"], vec!["y"], vec!["z"]]);
    }

    #[test]
    fn test_pairs_in_lexicographic_order() {
        let items = vec![1, 2, 3, 4];
        let subsets: Vec<_> = combinations_of(&items, 2).collect();
        assert_eq!(
            subsets,
            vec![
                vec![1, 2],
                vec![1, 3],
                vec![1, 4],
                vec![2, 3],
                vec![2, 4],
                vec![3, 4],
            ]
        );
    }

    #[test]
    fn test_k_larger_than_items_is_empty() {
        let items = vec!["a", "b"];
        assert_eq!(combinations_of(&items, 3).count(), 0);
    }

    #[test]
    fn test_k_equal_to_items_yields_whole_set() {
        let items = vec!["a", "b", "c"];
        let subsets: Vec<_> = combinations_of(&items, 3).collect();
        assert_eq!(subsets, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_zero_k_yields_one_empty_subset() {
        let items = vec!["a"];
        let subsets: Vec<Vec<&str>> = combinations_of(&items, 0).collect();
        assert_eq!(subsets, vec![Vec::<&str>::new()]);
    }

    #[test]
    fn test_generators_restart_on_each_call() {
        let items = vec!["a", "b"];
        let first: Vec<_> = combinations_of(&items, 1).collect();
        let second: Vec<_> = combinations_of(&items, 1).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_product_last_list_varies_fastest() {
        let lists = vec![vec!["a"], vec!["b", "c"]];
        let rows: Vec<_> = cartesian_product(&lists).collect();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["a", "c"]]);
    }

    #[test]
    fn test_product_row_major_order() {
        let lists = vec![vec![1, 2], vec![3, 4]];
        let rows: Vec<_> = cartesian_product(&lists).collect();
        assert_eq!(rows, vec![vec![1, 3], vec![1, 4], vec![2, 3], vec![2, 4]]);
    }

    #[test]
    fn test_product_with_empty_list_is_empty() {
        let lists = vec![vec![1, 2], vec![]];
        assert_eq!(cartesian_product(&lists).count(), 0);
    }

    #[test]
    fn test_product_of_no_lists() {
        let lists: Vec<Vec<u8>> = Vec::new();
        let rows: Vec<_> = cartesian_product(&lists).collect();
        assert_eq!(rows, vec![Vec::<u8>::new()]);
    }
}
