pub use sdkit_jws::utils::is_url_safe_base64_char;

pub trait TryRetainMut {
    type Item;

    /// Retains the items for which `f` returns `Ok(true)`, stopping at the
    /// first error.
    ///
    /// The callback receives the index the item will have in the filtered
    /// collection if it is retained.
    fn try_retain_mut<E>(
        &mut self,
        f: impl FnMut(usize, &mut Self::Item) -> Result<bool, E>,
    ) -> Result<(), E>;
}

impl<T> TryRetainMut for Vec<T> {
    type Item = T;

    fn try_retain_mut<E>(
        &mut self,
        mut f: impl FnMut(usize, &mut Self::Item) -> Result<bool, E>,
    ) -> Result<(), E> {
        let mut result = Ok(());
        let mut retained = 0;

        self.retain_mut(|t| {
            if result.is_ok() {
                match f(retained, t) {
                    Ok(true) => {
                        retained += 1;
                        true
                    }
                    Ok(false) => false,
                    Err(e) => {
                        result = Err(e);
                        false
                    }
                }
            } else {
                true
            }
        });

        result
    }
}
