//! The [`Handler`] trait, implemented for async functions of up to 16 parameters.
//!
//! A handler describes its signature once, through [`Handler::parameters`]
//! and the [`Handler::Output`] type, and is later invoked with arguments that
//! were produced by type-erased extractors.
//!
//! ```rust,ignore
//! async fn no_params() {}
//! async fn show(Get(q): Get<ArticleQuery>) -> String { q.category }
//! async fn rename(ctx: Context, Post(form): Post<Rename>) -> Result<Response, MyError> { .. }
//! ```

use std::any::{Any, type_name};
use std::future::Future;

use futures::future::BoxFuture;

use crate::error::ArgumentMismatch;
use crate::extract::{Param, ParamInfo};
use crate::reply::Reply;

/// An async function whose parameters are all [`Param`]s and whose output is a [`Reply`].
///
/// `Args` is a tuple of the parameter types; it only exists to keep the
/// blanket implementations apart.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    /// What the handler returns.
    type Output: Reply;

    /// The parameters, in declared order.
    fn parameters() -> Vec<ParamInfo>;

    /// Calls the handler with positional arguments.
    ///
    /// Fails if an argument is missing or is not of the declared type.
    fn invoke(
        &self,
        args: Vec<Box<dyn Any + Send>>,
    ) -> Result<BoxFuture<'static, Self::Output>, ArgumentMismatch>;
}

fn take_arg<T: 'static>(arg: Option<Box<dyn Any + Send>>) -> Result<T, ArgumentMismatch> {
    arg.and_then(|arg| arg.downcast::<T>().ok())
        .map(|arg| *arg)
        .ok_or(ArgumentMismatch {
            expected: type_name::<T>(),
        })
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: Reply,
            $( $ty: Param, )*
        {
            type Output = Res;

            fn parameters() -> Vec<ParamInfo> {
                vec![$(ParamInfo::of::<$ty>(),)*]
            }

            fn invoke(
                &self,
                args: Vec<Box<dyn Any + Send>>,
            ) -> Result<BoxFuture<'static, Res>, ArgumentMismatch> {
                let mut args = args.into_iter();
                $(
                    let $ty = take_arg::<$ty>(args.next())?;
                )*
                let f = self.clone();
                Ok(Box::pin(f($($ty,)*)))
            }
        }
    };
}

// Generate implementations for 0-16 parameters
impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15
);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15, T16
);
